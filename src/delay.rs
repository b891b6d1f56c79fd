//! Cooldown applied to a proxy after use.

use rand::Rng;
use std::time::Duration;

/// Base cooldown, optionally jittered uniformly within `[0.5 * base, 1.5 * base]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownDelay {
    base: Duration,
    randomize: bool,
}

impl CooldownDelay {
    pub fn new(base: Duration, randomize: bool) -> Self {
        Self { base, randomize }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Draw the cooldown for one return.
    pub fn sample(&self) -> Duration {
        if !self.randomize || self.base.is_zero() {
            return self.base;
        }
        let base = self.base.as_secs_f64();
        let mut rng = rand::rng();
        Duration::from_secs_f64(rng.random_range(0.5 * base..=1.5 * base))
    }
}
