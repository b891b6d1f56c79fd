//! Configuration for the proxy scheduler and the rotation middleware.

use std::time::Duration;

/// Options that drive the scheduler itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Sequence ceiling before the pool is renumbered. Should exceed the proxy count.
    pub max_sequence: u64,
    /// Longest time `checkout` waits for an eligible proxy.
    pub no_proxy_timeout: Duration,
    /// Cooldown before a returned proxy is eligible again.
    pub proxy_delay: Duration,
    /// Jitter the cooldown uniformly by ±50%.
    pub randomize_delay: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_sequence: 1_000_000,
            no_proxy_timeout: Duration::from_secs(300),
            proxy_delay: Duration::from_secs(3),
            randomize_delay: true,
        }
    }
}

/// Configuration for the rotation middleware.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Files or URLs to read proxy lists from, one address per line.
    pub sources: Vec<String>,
    /// Proxy addresses given inline.
    pub proxies: Vec<String>,
    /// Scheduler options.
    pub scheduler: SchedulerSettings,
    /// Cooldown applied to a proxy whose request was detected as banned.
    pub ban_delay: Duration,
    /// Cooldown applied after a connection failure. `None` returns the proxy without penalty.
    pub connect_failure_delay: Option<Duration>,
    /// Number of times to retry a request with different proxies.
    pub retry_count: usize,
    /// Fail immediately when no proxy is available instead of resetting the pool once.
    pub stop_if_no_proxies: bool,
    /// Timeout for a single proxied request.
    pub request_timeout: Duration,
    /// Maximum requests per second per proxy host.
    pub max_requests_per_second: Option<f64>,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    sources: Vec<String>,
    proxies: Vec<String>,
    max_sequence: Option<u64>,
    no_proxy_timeout: Option<Duration>,
    proxy_delay: Option<Duration>,
    randomize_delay: Option<bool>,
    ban_delay: Option<Duration>,
    connect_failure_delay: Option<Duration>,
    retry_count: Option<usize>,
    stop_if_no_proxies: Option<bool>,
    request_timeout: Option<Duration>,
    max_requests_per_second: Option<f64>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            proxies: Vec::new(),
            max_sequence: None,
            no_proxy_timeout: None,
            proxy_delay: None,
            randomize_delay: None,
            ban_delay: None,
            connect_failure_delay: None,
            retry_count: None,
            stop_if_no_proxies: None,
            request_timeout: None,
            max_requests_per_second: None,
        }
    }

    /// Set the files or URLs to read proxy lists from.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set proxy addresses directly.
    pub fn proxies(mut self, proxies: Vec<impl Into<String>>) -> Self {
        self.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the sequence ceiling before the pool is renumbered.
    pub fn max_sequence(mut self, max: u64) -> Self {
        self.max_sequence = Some(max);
        self
    }

    /// Set how long `checkout` may wait for an eligible proxy.
    pub fn no_proxy_timeout(mut self, timeout: Duration) -> Self {
        self.no_proxy_timeout = Some(timeout);
        self
    }

    /// Set the cooldown applied after a proxy is used.
    pub fn proxy_delay(mut self, delay: Duration) -> Self {
        self.proxy_delay = Some(delay);
        self
    }

    /// Enable or disable ±50% jitter on the cooldown.
    pub fn randomize_delay(mut self, randomize: bool) -> Self {
        self.randomize_delay = Some(randomize);
        self
    }

    /// Set the cooldown applied to a banned proxy.
    pub fn ban_delay(mut self, delay: Duration) -> Self {
        self.ban_delay = Some(delay);
        self
    }

    /// Park proxies for `delay` after a connection failure.
    pub fn connect_failure_delay(mut self, delay: Duration) -> Self {
        self.connect_failure_delay = Some(delay);
        self
    }

    /// Set the number of times to retry a request with different proxies.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Fail requests right away when the pool is exhausted.
    pub fn stop_if_no_proxies(mut self, stop: bool) -> Self {
        self.stop_if_no_proxies = Some(stop);
        self
    }

    /// Set the timeout for a single proxied request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the maximum requests per second per proxy host.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        let defaults = SchedulerSettings::default();
        ProxyPoolConfig {
            sources: self.sources,
            proxies: self.proxies,
            scheduler: SchedulerSettings {
                max_sequence: self.max_sequence.unwrap_or(defaults.max_sequence),
                no_proxy_timeout: self.no_proxy_timeout.unwrap_or(defaults.no_proxy_timeout),
                proxy_delay: self.proxy_delay.unwrap_or(defaults.proxy_delay),
                randomize_delay: self.randomize_delay.unwrap_or(defaults.randomize_delay),
            },
            ban_delay: self.ban_delay.unwrap_or(Duration::from_secs(30)),
            connect_failure_delay: self.connect_failure_delay,
            retry_count: self.retry_count.unwrap_or(5),
            stop_if_no_proxies: self.stop_if_no_proxies.unwrap_or(false),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            max_requests_per_second: self.max_requests_per_second,
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
