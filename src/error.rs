//! Error types for the reqwest-proxy-rotator crate.

use thiserror::Error;

/// Error returned when no proxy became eligible within the allowed wait.
#[derive(Debug, Error)]
#[error("No proxy available in pool")]
pub struct NoProxyAvailable;

/// Errors raised by the proxy scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A proxy was reported back without an address.
    #[error("cannot return a proxy with an empty address")]
    EmptyAddress,
    /// The address carries no explicit scheme (e.g. `http://`).
    #[error("proxy address {0} has no scheme")]
    MissingScheme(String),
    /// The seed list contained the same address twice.
    #[error("proxy address {0} appears more than once")]
    DuplicateAddress(String),
    /// The address was never part of the pool.
    #[error("proxy {0} is not part of the pool")]
    UnknownAddress(String),
    /// The address is already waiting in the pool and was not checked out.
    #[error("proxy {0} is already in the pool")]
    AlreadyPooled(String),
}

/// Errors raised while setting up the rotation middleware.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No usable proxy address was found in the configured list and sources.
    #[error("proxy list is empty")]
    EmptyProxyList,
    /// The scheduler rejected the proxy list.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
