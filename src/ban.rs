//! Ban detection for proxied requests.

use reqwest::StatusCode;

/// Decides whether a proxied request was blocked by the target.
///
/// A banned proxy still works, so it goes back into the pool with a longer
/// cooldown and the request is retried with another proxy.
pub trait BanPolicy: Send + Sync {
    /// Whether the response means the proxy was banned.
    fn response_is_ban(&self, response: &reqwest::Response) -> bool;

    /// Whether a transport error means the proxy was banned.
    ///
    /// Connection failures are not passed here; they are handled separately.
    fn error_is_ban(&self, error: &reqwest::Error) -> bool;
}

/// Treats any status outside an allow-list, and any non-connect transport error, as a ban.
#[derive(Debug, Clone)]
pub struct DefaultBanPolicy {
    allowed: Vec<StatusCode>,
}

impl DefaultBanPolicy {
    pub fn new(allowed: Vec<StatusCode>) -> Self {
        Self { allowed }
    }
}

impl Default for DefaultBanPolicy {
    fn default() -> Self {
        Self::new(vec![StatusCode::OK, StatusCode::MOVED_PERMANENTLY, StatusCode::FOUND])
    }
}

impl BanPolicy for DefaultBanPolicy {
    fn response_is_ban(&self, response: &reqwest::Response) -> bool {
        !self.allowed.contains(&response.status())
    }

    fn error_is_ban(&self, _error: &reqwest::Error) -> bool {
        true
    }
}
