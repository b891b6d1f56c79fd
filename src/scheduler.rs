//! Proxy scheduler: hands out the proxy whose cooldown ends first.

use crate::config::SchedulerSettings;
use crate::delay::CooldownDelay;
use crate::error::SchedulerError;
use crate::pool::Pool;
use crate::proxy::Entry;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::{self, Instant};

/// Time-ordered proxy pool shared by every request worker.
///
/// The pool lock is only held for the duration of a single decision. Checkouts
/// are serialised by a separate async gate, so a caller blocked on a cooldown
/// throttles other checkouts without stopping proxies from being returned.
pub struct ProxyScheduler {
    pool: Mutex<Pool>,
    checkout_gate: AsyncMutex<()>,
    returned: Notify,
    delay: CooldownDelay,
    no_proxy_timeout: Duration,
}

impl ProxyScheduler {
    /// Seed a scheduler where every proxy is eligible immediately, in list order.
    ///
    /// Addresses must be deduplicated and carry a scheme. Only these addresses
    /// can ever be returned to the pool. An empty list is accepted, but every
    /// `checkout` on it times out.
    pub fn new(addresses: Vec<String>, settings: SchedulerSettings) -> Result<Self, SchedulerError> {
        if settings.max_sequence < addresses.len() as u64 {
            warn!(
                "max_sequence {} is below the proxy count {}, the pool will be renumbered on every return",
                settings.max_sequence,
                addresses.len()
            );
        }

        let pool = Pool::seed(addresses, Instant::now(), settings.max_sequence)?;
        let delay = CooldownDelay::new(settings.proxy_delay, settings.randomize_delay);
        info!(
            "Proxy scheduler seeded with {} proxies, cooldown {:?}",
            pool.len(),
            delay.base()
        );

        Ok(Self {
            pool: Mutex::new(pool),
            checkout_gate: AsyncMutex::new(()),
            returned: Notify::new(),
            delay,
            no_proxy_timeout: settings.no_proxy_timeout,
        })
    }

    /// Take the proxy that becomes eligible first.
    ///
    /// Returns at once if it is already eligible, sleeps until it is if that
    /// happens within `no_proxy_timeout`, and otherwise waits for a proxy to be
    /// returned. Gives up with `None` once `no_proxy_timeout` has elapsed. A
    /// proxy that is not handed out stays in the pool.
    pub async fn checkout(&self) -> Option<String> {
        // Time spent queued behind other checkouts counts against the timeout.
        let deadline = Instant::now() + self.no_proxy_timeout;
        let Ok(_gate) = time::timeout_at(deadline, self.checkout_gate.lock()).await else {
            warn!("No proxy became eligible within {:?}", self.no_proxy_timeout);
            return None;
        };

        loop {
            let returned = self.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            let now = Instant::now();
            let next = {
                let mut pool = self.pool.lock();
                let next = pool.peek().map(Entry::eligible_at);
                if next.is_some_and(|eligible_at| eligible_at <= now) {
                    return pool.pop().map(Entry::into_address);
                }
                next
            };

            if now >= deadline {
                warn!("No proxy became eligible within {:?}", self.no_proxy_timeout);
                return None;
            }

            let wake_at = match next {
                Some(eligible_at) if eligible_at <= deadline => {
                    debug!("Next proxy is eligible in {:?}, waiting", eligible_at - now);
                    eligible_at
                }
                Some(_) => deadline,
                None => {
                    debug!("Proxy pool is empty, waiting for a proxy to be returned");
                    deadline
                }
            };

            tokio::select! {
                _ = time::sleep_until(wake_at) => {}
                _ = &mut returned => {}
            }
        }
    }

    /// Put a checked-out proxy back, eligible again after its cooldown.
    ///
    /// `delay_override` replaces the configured cooldown, e.g. to park a banned
    /// proxy for longer.
    pub fn return_proxy(&self, address: &str, delay_override: Option<Duration>) -> Result<(), SchedulerError> {
        if address.trim().is_empty() {
            error!("Proxy returned without an address");
            return Err(SchedulerError::EmptyAddress);
        }

        let delay = delay_override.unwrap_or_else(|| self.delay.sample());
        let eligible_at = Instant::now() + delay;

        if let Err(err) = self.pool.lock().push(address, eligible_at) {
            error!("Rejected return of proxy {}: {}", address, err);
            return Err(err);
        }
        debug!("Proxy {} eligible again in {:?}", address, delay);

        self.returned.notify_waiters();
        Ok(())
    }

    /// Park a proxy that failed hard for `duration`.
    pub fn mark_unavailable(&self, address: &str, duration: Duration) -> Result<(), SchedulerError> {
        warn!("Proxy {} marked unavailable for {:?}", address, duration);
        self.return_proxy(address, Some(duration))
    }

    /// Renumber every queued proxy by priority, keeping their cooldowns.
    pub fn reset(&self) {
        let mut pool = self.pool.lock();
        info!("Resetting proxy pool with {} queued proxies", pool.len());
        pool.renumber();
    }

    /// Get statistics about the pool: (known proxies, proxies waiting in the pool).
    pub fn stats(&self) -> (usize, usize) {
        let pool = self.pool.lock();
        (pool.known(), pool.len())
    }

    /// Queued proxies in the order they would be checked out.
    pub fn pending(&self) -> Vec<Entry> {
        self.pool.lock().ordered()
    }

    /// Longest time a single `checkout` waits.
    pub fn no_proxy_timeout(&self) -> Duration {
        self.no_proxy_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn settings(timeout: Duration, delay: Duration) -> SchedulerSettings {
        SchedulerSettings {
            max_sequence: 1_000,
            no_proxy_timeout: timeout,
            proxy_delay: delay,
            randomize_delay: false,
        }
    }

    /// Paused time advances in whole milliseconds of timer resolution.
    fn assert_waited(start: Instant, expected: Duration) {
        let waited = start.elapsed();
        assert!(waited >= expected, "waited {waited:?}, expected {expected:?}");
        assert!(waited < expected + Duration::from_millis(10), "waited {waited:?}, expected {expected:?}");
    }

    fn proxies(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("http://{n}:3128")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_in_seed_order_and_readmits() {
        let scheduler = ProxyScheduler::new(proxies(&["a", "b", "c"]), settings(Duration::from_secs(1), Duration::ZERO)).unwrap();
        let start = Instant::now();

        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://a:3128"));
        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://b:3128"));
        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://c:3128"));

        scheduler.return_proxy("http://a:3128", None).unwrap();
        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://a:3128"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn far_cooldown_times_out_and_keeps_proxy() {
        let scheduler = ProxyScheduler::new(proxies(&["a"]), settings(Duration::from_secs(1), Duration::ZERO)).unwrap();
        let proxy = scheduler.checkout().await.unwrap();
        scheduler.return_proxy(&proxy, Some(Duration::from_secs(5))).unwrap();

        let start = Instant::now();
        assert_eq!(scheduler.checkout().await, None);
        assert_waited(start, Duration::from_secs(1));

        assert_eq!(scheduler.stats(), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn near_cooldown_blocks_for_the_remaining_time() {
        let scheduler = ProxyScheduler::new(proxies(&["a"]), settings(Duration::from_secs(1), Duration::ZERO)).unwrap();
        let proxy = scheduler.checkout().await.unwrap();
        scheduler.return_proxy(&proxy, Some(Duration::from_millis(400))).unwrap();
        let eligible_at = scheduler.pending()[0].eligible_at();

        let start = Instant::now();
        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://a:3128"));
        assert!(Instant::now() >= eligible_at);
        assert_waited(start, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_times_out() {
        let scheduler = ProxyScheduler::new(Vec::new(), settings(Duration::from_secs(3), Duration::ZERO)).unwrap();

        assert_eq!(scheduler.no_proxy_timeout(), Duration::from_secs(3));

        let start = Instant::now();
        assert_eq!(scheduler.checkout().await, None);
        assert_waited(start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_wakes_when_proxy_returned() {
        let scheduler = Arc::new(ProxyScheduler::new(proxies(&["a"]), settings(Duration::from_secs(10), Duration::ZERO)).unwrap());
        let proxy = scheduler.checkout().await.unwrap();

        let returner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move {
            time::sleep(Duration::from_secs(2)).await;
            returner.return_proxy(&proxy, None).unwrap();
        });

        let start = Instant::now();
        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://a:3128"));
        assert_waited(start, Duration::from_secs(2));
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_return_cuts_a_cooldown_wait_short() {
        let scheduler = Arc::new(ProxyScheduler::new(proxies(&["a", "b"]), settings(Duration::from_secs(10), Duration::ZERO)).unwrap());
        let a = scheduler.checkout().await.unwrap();
        let b = scheduler.checkout().await.unwrap();
        scheduler.return_proxy(&a, Some(Duration::from_secs(8))).unwrap();

        let returner = Arc::clone(&scheduler);
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            returner.return_proxy(&b, None).unwrap();
        });

        let start = Instant::now();
        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://b:3128"));
        assert_waited(start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn misuse_does_not_corrupt_the_pool() {
        let scheduler = ProxyScheduler::new(proxies(&["a", "b"]), settings(Duration::from_secs(1), Duration::ZERO)).unwrap();

        assert_eq!(scheduler.return_proxy("", None), Err(SchedulerError::EmptyAddress));
        assert_eq!(scheduler.return_proxy("   ", None), Err(SchedulerError::EmptyAddress));
        assert_eq!(
            scheduler.return_proxy("http://b:3128", None),
            Err(SchedulerError::AlreadyPooled("http://b:3128".into()))
        );
        assert_eq!(
            scheduler.return_proxy("http://stranger:3128", None),
            Err(SchedulerError::UnknownAddress("http://stranger:3128".into()))
        );
        assert_eq!(scheduler.stats(), (2, 2));

        let queued: Vec<String> = scheduler.pending().iter().map(|e| e.address().to_string()).collect();
        assert_eq!(queued, proxies(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn mark_unavailable_parks_the_proxy() {
        let scheduler = ProxyScheduler::new(proxies(&["a", "b"]), settings(Duration::from_secs(1), Duration::ZERO)).unwrap();
        let a = scheduler.checkout().await.unwrap();
        scheduler.mark_unavailable(&a, Duration::from_secs(600)).unwrap();

        assert_eq!(scheduler.checkout().await.as_deref(), Some("http://b:3128"));
        assert_eq!(scheduler.checkout().await, None);
        assert_eq!(scheduler.pending()[0].address(), "http://a:3128");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_keeps_priority_order() {
        let scheduler = ProxyScheduler::new(proxies(&["a", "b", "c", "d"]), settings(Duration::from_secs(1), Duration::ZERO)).unwrap();
        for delay_ms in [40, 10, 40, 0] {
            let proxy = scheduler.checkout().await.unwrap();
            scheduler.return_proxy(&proxy, Some(Duration::from_millis(delay_ms))).unwrap();
        }
        let before = scheduler.pending();

        scheduler.reset();

        let after = scheduler.pending();
        assert_eq!(after.iter().map(Entry::sequence).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.address(), new.address());
            assert_eq!(old.eligible_at(), new.eligible_at());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn random_traffic_keeps_addresses_unique_and_ordered() {
        let names: Vec<String> = (0..8).map(|i| format!("http://10.0.0.{i}:8080")).collect();
        let scheduler = ProxyScheduler::new(
            names.clone(),
            SchedulerSettings {
                max_sequence: 20,
                no_proxy_timeout: Duration::from_millis(50),
                proxy_delay: Duration::from_millis(10),
                randomize_delay: true,
            },
        )
        .unwrap();
        let mut checked_out: Vec<String> = Vec::new();
        let mut rng = rand::rng();

        for _ in 0..500 {
            if checked_out.is_empty() || rng.random_bool(0.5) {
                let expected = scheduler.pending().first().map(|e| e.address().to_string());
                let eligible_now = scheduler
                    .pending()
                    .first()
                    .is_some_and(|e| e.eligible_at() <= Instant::now());
                if let Some(proxy) = scheduler.checkout().await {
                    if eligible_now {
                        assert_eq!(Some(&proxy), expected.as_ref());
                    }
                    checked_out.push(proxy);
                }
            } else {
                let index = rng.random_range(0..checked_out.len());
                let proxy = checked_out.swap_remove(index);
                let override_ms = rng.random_range(0..30);
                scheduler
                    .return_proxy(&proxy, Some(Duration::from_millis(override_ms)))
                    .unwrap();
            }

            let queued: Vec<String> = scheduler.pending().iter().map(|e| e.address().to_string()).collect();
            let unique: HashSet<&String> = queued.iter().collect();
            assert_eq!(unique.len(), queued.len());
            assert!(checked_out.iter().all(|p| !unique.contains(p)));
            assert_eq!(queued.len() + checked_out.len(), names.len());
        }
    }
}
