//! Pool entries and proxy address helpers.

use tokio::time::Instant;
use url::Url;

/// One proxy waiting in the pool.
///
/// Field order matters: the derived ordering compares `eligible_at` first and
/// `sequence` second, which is the pool's priority key. Sequences are unique
/// within a pool, so `address` never takes part in a comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    eligible_at: Instant,
    sequence: u64,
    address: String,
}

impl Entry {
    pub(crate) fn new(address: String, eligible_at: Instant, sequence: u64) -> Self {
        Self {
            eligible_at,
            sequence,
            address,
        }
    }

    /// The proxy URL (e.g. "http://127.0.0.1:8080").
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Instant after which the proxy may be handed out again.
    pub fn eligible_at(&self) -> Instant {
        self.eligible_at
    }

    /// Tie-break among entries that become eligible at the same instant.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn renumber(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub(crate) fn into_address(self) -> String {
        self.address
    }
}

/// Whether the address starts with an explicit `scheme://`.
pub fn has_scheme(address: &str) -> bool {
    match address.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Return the download slot for a proxy.
///
/// Proxies on the same host share a slot regardless of port. Falls back to the
/// whole address when it cannot be parsed as a URL.
pub fn proxy_slot(address: &str) -> String {
    Url::parse(address)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| address.to_string())
}
