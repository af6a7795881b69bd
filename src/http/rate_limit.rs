//! Request throttling
//!
//! Token bucket from the governor crate, shared by every requester of a
//! stream definition so creation, polling and download calls draw from the
//! same budget.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per second
    pub requests_per_second: u32,
    /// Burst size (max tokens in bucket)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

fn default_burst_size() -> u32 {
    1
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

impl RateLimiterConfig {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    fn quota(&self) -> Quota {
        let per_second = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(per_second).allow_burst(burst)
    }
}

/// Token bucket rate limiter, cheap to clone
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            limiter: Arc::new(Governor::direct(config.quota())),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml_defaults_burst() {
        let config: RateLimiterConfig = serde_yaml::from_str("requests_per_second: 5").unwrap();
        assert_eq!(config, RateLimiterConfig::new(5, 1));
    }

    #[test]
    fn test_burst_is_enforced() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1, 3));
        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_zero_values_fall_back_to_one() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(0, 0));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_clones_share_the_bucket() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1, 1));
        let clone = limiter.clone();
        limiter.wait().await;
        assert!(!clone.try_acquire());
    }
}
