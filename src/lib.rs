//! # reqwest-proxy-rotator
//!
//! A cooldown-ordered proxy rotation middleware for reqwest.
//!
//! Proxies wait in a pool ordered by the instant they become usable again.
//! Each request takes the proxy whose cooldown ends first, and the proxy goes
//! back into the pool once the request finishes: after the normal delay on
//! success, or after a longer one when the target banned it.

pub mod ban;
pub mod config;
pub mod delay;
pub mod error;
pub mod middleware;
mod pool;
pub mod proxy;
pub mod scheduler;
mod utils;

pub use ban::{BanPolicy, DefaultBanPolicy};
pub use config::{ProxyPoolConfig, ProxyPoolConfigBuilder, SchedulerSettings};
pub use delay::CooldownDelay;
pub use error::{ConfigError, NoProxyAvailable, SchedulerError};
pub use middleware::{ProxyAssignment, ProxyRotationMiddleware};
pub use proxy::{proxy_slot, Entry};
pub use scheduler::ProxyScheduler;
pub use utils::normalize_proxy_list;
