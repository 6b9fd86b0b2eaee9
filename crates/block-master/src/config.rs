//! Block master configuration.
//!
//! Environment variables (milliseconds):
//! - `BM_WORKER_TIMEOUT_MS`: heartbeat timeout before a worker is marked lost
//! - `BM_LOST_WORKER_CHECK_INTERVAL_MS`: period of the lost-worker sweep
//! - `BM_CACHE_GRANT_TIMEOUT_MS`: age at which a cache reservation is reclaimed
//! - `BM_CACHE_GRANT_SWEEP_INTERVAL_MS`: period of the reservation sweep

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A sweep runs less often than the timeout it enforces.
    #[error("{interval} ({interval_ms}ms) must not exceed {timeout} ({timeout_ms}ms)")]
    IntervalExceedsTimeout {
        /// Name of the interval setting
        interval: &'static str,
        /// Interval value
        interval_ms: u64,
        /// Name of the timeout setting
        timeout: &'static str,
        /// Timeout value
        timeout_ms: u64,
    },
}

/// Timeouts and sweep periods of the block master.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMasterConfig {
    /// Heartbeat timeout after which an active worker is marked lost.
    pub worker_timeout: Duration,
    /// How often the lost-worker sweep runs.
    pub lost_worker_check_interval: Duration,
    /// Age after which an unconfirmed cache reservation is reclaimed.
    pub cache_grant_timeout: Duration,
    /// How often the reservation sweep runs.
    pub cache_grant_sweep_interval: Duration,
}

impl Default for BlockMasterConfig {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(300),
            lost_worker_check_interval: Duration::from_secs(10),
            cache_grant_timeout: Duration::from_secs(60),
            cache_grant_sweep_interval: Duration::from_secs(10),
        }
    }
}

impl BlockMasterConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            worker_timeout: Duration::from_secs(5),
            lost_worker_check_interval: Duration::from_millis(100),
            cache_grant_timeout: Duration::from_secs(2),
            cache_grant_sweep_interval: Duration::from_millis(100),
        }
    }

    /// Defaults overridden by `BM_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `BM_*` key.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str, target: &mut Duration| {
            let Some(raw) = lookup(key) else {
                return;
            };
            match raw.trim().parse::<u64>() {
                Ok(ms) => *target = Duration::from_millis(ms),
                Err(_) => warn!(key, value = %raw, "Ignoring unparseable duration"),
            }
        };

        read("BM_WORKER_TIMEOUT_MS", &mut config.worker_timeout);
        read(
            "BM_LOST_WORKER_CHECK_INTERVAL_MS",
            &mut config.lost_worker_check_interval,
        );
        read("BM_CACHE_GRANT_TIMEOUT_MS", &mut config.cache_grant_timeout);
        read(
            "BM_CACHE_GRANT_SWEEP_INTERVAL_MS",
            &mut config.cache_grant_sweep_interval,
        );
        config
    }

    /// Check that every duration is positive and each sweep runs at least as
    /// often as the timeout it enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("worker_timeout", self.worker_timeout),
            ("lost_worker_check_interval", self.lost_worker_check_interval),
            ("cache_grant_timeout", self.cache_grant_timeout),
            ("cache_grant_sweep_interval", self.cache_grant_sweep_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(*name));
        }

        let pairs = [
            (
                "lost_worker_check_interval",
                self.lost_worker_check_interval,
                "worker_timeout",
                self.worker_timeout,
            ),
            (
                "cache_grant_sweep_interval",
                self.cache_grant_sweep_interval,
                "cache_grant_timeout",
                self.cache_grant_timeout,
            ),
        ];
        for (interval, interval_value, timeout, timeout_value) in pairs {
            if interval_value > timeout_value {
                return Err(ConfigError::IntervalExceedsTimeout {
                    interval,
                    interval_ms: interval_value.as_millis() as u64,
                    timeout,
                    timeout_ms: timeout_value.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}
