//! Cache configuration

use std::time::Duration;

/// Configuration for one cache namespace.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Logical time-to-live of a stored value.
    pub ttl: Duration,
    /// Update latency limit: how long the local tier may keep serving a
    /// value after the shared store has been updated by another writer.
    /// Zero disables local shadowing entirely.
    pub ull: Duration,
    /// Upper bound on how long a mandatory refresh waits for the lease.
    pub get_timeout: Duration,
    /// Maximum recomputations per second for one key, across all processes.
    pub recompute_rate: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300), // 5 minutes
            ull: Duration::ZERO,
            get_timeout: Duration::from_secs(10),
            recompute_rate: 1.0,
        }
    }
}

impl CacheConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn with_ull(mut self, ull: Duration) -> Self {
        self.ull = ull;
        self
    }

    pub fn with_get_timeout(mut self, get_timeout: Duration) -> Self {
        self.get_timeout = get_timeout;
        self
    }

    pub fn with_recompute_rate(mut self, recompute_rate: f64) -> Self {
        self.recompute_rate = recompute_rate;
        self
    }

    /// TTL of the refresh lease: the inverse of the recompute rate, but
    /// never less than one second so a high rate cannot disable throttling.
    pub fn lease_ttl(&self) -> Duration {
        let secs = if self.recompute_rate > 0.0 {
            (1.0 / self.recompute_rate).max(1.0)
        } else {
            1.0
        };
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_ttl_never_rounds_down_to_zero() {
        let fast = CacheConfig::new(Duration::from_secs(60)).with_recompute_rate(1000.0);
        assert_eq!(fast.lease_ttl(), Duration::from_secs(1));

        let slow = CacheConfig::new(Duration::from_secs(60)).with_recompute_rate(0.1);
        assert_eq!(slow.lease_ttl(), Duration::from_secs(10));

        let degenerate = CacheConfig::new(Duration::from_secs(60)).with_recompute_rate(0.0);
        assert_eq!(degenerate.lease_ttl(), Duration::from_secs(1));
    }
}
