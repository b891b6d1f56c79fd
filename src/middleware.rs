//! Middleware implementation for reqwest.

use crate::ban::{BanPolicy, DefaultBanPolicy};
use crate::config::ProxyPoolConfig;
use crate::error::{ConfigError, NoProxyAvailable};
use crate::proxy::proxy_slot;
use crate::scheduler::ProxyScheduler;
use crate::utils;

use anyhow::anyhow;
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use log::{error, info, warn};
use parking_lot::Mutex;
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Proxy chosen for a request, stored in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAssignment {
    /// The proxy URL.
    pub address: String,
    /// Download slot: the proxy host without its port.
    pub slot: String,
}

/// How a proxied attempt ended, as far as the proxy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Ban,
    ConnectFailure,
}

/// A checked-out proxy.
///
/// Dropping a lease that was never settled, e.g. when the request future is
/// cancelled mid-flight, returns the proxy to the pool without penalty.
struct ProxyLease {
    scheduler: Arc<ProxyScheduler>,
    address: String,
    settled: bool,
}

impl ProxyLease {
    fn new(scheduler: &Arc<ProxyScheduler>, address: String) -> Self {
        Self {
            scheduler: Arc::clone(scheduler),
            address,
            settled: false,
        }
    }
}

impl fmt::Debug for ProxyLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyLease")
            .field("address", &self.address)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for ProxyLease {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("Request through proxy {} was abandoned, returning the proxy", self.address);
        if let Err(e) = self.scheduler.return_proxy(&self.address, None) {
            error!("Failed to return abandoned proxy {}: {}", self.address, e);
        }
    }
}

/// Middleware that sends each request through the next eligible proxy.
#[derive(Clone)]
pub struct ProxyRotationMiddleware {
    scheduler: Arc<ProxyScheduler>,
    config: Arc<ProxyPoolConfig>,
    policy: Arc<dyn BanPolicy>,
    /// One client per proxy address.
    clients: Arc<Mutex<HashMap<String, reqwest::Client>>>,
    /// Request budget shared by all proxies on the same host.
    limiter: Option<Arc<DefaultKeyedRateLimiter<String>>>,
}

impl ProxyRotationMiddleware {
    /// Create the middleware, loading proxies from the configured list and sources.
    pub async fn new(config: ProxyPoolConfig) -> std::result::Result<Self, ConfigError> {
        let proxies = utils::load_proxy_list(&config).await;
        Self::with_proxies(config, proxies)
    }

    /// Create the middleware from an already normalized proxy list.
    pub fn with_proxies(config: ProxyPoolConfig, proxies: Vec<String>) -> std::result::Result<Self, ConfigError> {
        if proxies.is_empty() {
            error!("No proxies configured");
            return Err(ConfigError::EmptyProxyList);
        }

        let scheduler = ProxyScheduler::new(proxies, config.scheduler.clone())?;
        let (total, available) = scheduler.stats();
        info!("Proxy rotation initialized with {}/{} available proxies", available, total);

        let limiter = config.max_requests_per_second.map(|rps| {
            let per_second = NonZeroU32::new(rps.ceil() as u32).unwrap_or(NonZeroU32::MIN);
            Arc::new(RateLimiter::keyed(Quota::per_second(per_second)))
        });

        Ok(Self {
            scheduler: Arc::new(scheduler),
            config: Arc::new(config),
            policy: Arc::new(DefaultBanPolicy::default()),
            clients: Arc::new(Mutex::new(HashMap::new())),
            limiter,
        })
    }

    /// Replace the ban detection policy.
    pub fn with_ban_policy(mut self, policy: impl BanPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// The scheduler behind this middleware.
    pub fn scheduler(&self) -> &Arc<ProxyScheduler> {
        &self.scheduler
    }

    /// Check out a proxy, resetting the pool once if none is available.
    async fn acquire(&self) -> std::result::Result<ProxyLease, NoProxyAvailable> {
        if let Some(proxy) = self.scheduler.checkout().await {
            return Ok(ProxyLease::new(&self.scheduler, proxy));
        }
        if self.config.stop_if_no_proxies {
            error!("No proxies available");
            return Err(NoProxyAvailable);
        }

        warn!(
            "No proxies available within {:?}; resetting the proxy pool",
            self.scheduler.no_proxy_timeout()
        );
        self.scheduler.reset();
        match self.scheduler.checkout().await {
            Some(proxy) => Ok(ProxyLease::new(&self.scheduler, proxy)),
            None => {
                error!("No proxies available even after a reset");
                Err(NoProxyAvailable)
            }
        }
    }

    /// Report the outcome of an attempt back to the scheduler.
    fn settle(&self, mut lease: ProxyLease, outcome: Outcome) -> Result<()> {
        lease.settled = true;
        let proxy_url = lease.address.as_str();
        let result = match outcome {
            Outcome::Success => self.scheduler.return_proxy(proxy_url, None),
            Outcome::Ban => {
                info!("Parking banned proxy {} for {:?}", proxy_url, self.config.ban_delay);
                self.scheduler.return_proxy(proxy_url, Some(self.config.ban_delay))
            }
            Outcome::ConnectFailure => match self.config.connect_failure_delay {
                Some(delay) => self.scheduler.mark_unavailable(proxy_url, delay),
                None => self.scheduler.return_proxy(proxy_url, None),
            },
        };
        result.map_err(|e| Error::Middleware(anyhow!(e)))
    }

    fn classify_error(&self, err: &reqwest::Error) -> Outcome {
        if err.is_connect() {
            Outcome::ConnectFailure
        } else if self.policy.error_is_ban(err) {
            Outcome::Ban
        } else {
            Outcome::Success
        }
    }

    fn client_for(&self, proxy_url: &str) -> std::result::Result<reqwest::Client, reqwest::Error> {
        if let Some(client) = self.clients.lock().get(proxy_url) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy_url)?)
            .timeout(self.config.request_timeout)
            .build()?;
        self.clients.lock().insert(proxy_url.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Middleware for ProxyRotationMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let max_retries = self.config.retry_count;
        let mut retry_count = 0;

        loop {
            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                        .to_string()
                ))
            })?;

            let lease = match self.acquire().await {
                Ok(lease) => lease,
                Err(e) => {
                    let (total, available) = self.scheduler.stats();
                    warn!("No proxy available. Total: {}, Available: {}", total, available);
                    return Err(Error::Middleware(anyhow!(e)));
                }
            };
            let proxy_url = lease.address.clone();
            let slot = proxy_slot(&proxy_url);
            info!("Using proxy: {} (attempt {})", proxy_url, retry_count + 1);
            extensions.insert(ProxyAssignment {
                address: proxy_url.clone(),
                slot: slot.clone(),
            });

            if let Some(limiter) = &self.limiter {
                limiter.until_key_ready(&slot).await;
            }

            let client = match self.client_for(&proxy_url) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to build client with proxy {}: {}", proxy_url, e);
                    self.settle(lease, Outcome::ConnectFailure)?;
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(e));
                    }
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) if self.policy.response_is_ban(&response) => {
                    warn!(
                        "Proxy {} banned with status {} (attempt {})",
                        proxy_url,
                        response.status(),
                        retry_count + 1
                    );
                    self.settle(lease, Outcome::Ban)?;
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Ok(response);
                    }
                }
                Ok(response) => {
                    self.settle(lease, Outcome::Success)?;
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        proxy_url,
                        retry_count + 1,
                        err
                    );
                    let outcome = self.classify_error(&err);
                    self.settle(lease, outcome)?;
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(err));
                    }
                }
            }
        }
    }
}
