use std::time::Duration;
use thiserror::Error;

/// Queue tuning knobs. Validated once at service construction; invalid
/// settings fail fast before any work is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Soft capacity limit. Crossing it logs, never rejects.
    pub max_size: usize,
    /// Failed attempts before a job is moved to the dead letter store.
    pub max_retries: u32,
    /// First retry delay; doubles with every further failure.
    pub backoff_base_delay: Duration,
    /// Concurrency of the parallel-batch execution pool. Tuned for I/O-bound
    /// work, so a small number goes a long way.
    pub pool_concurrency: usize,
    /// How long the worker sleeps when the queue is empty, absent a wake.
    pub poll_interval: Duration,
    /// How long `stop` waits for the in-flight batch before giving up on it.
    pub shutdown_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_retries: 3,
            backoff_base_delay: Duration::from_secs(10),
            pool_concurrency: 4,
            poll_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::MaxSize);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::MaxRetries);
        }
        if self.backoff_base_delay.is_zero() {
            return Err(ConfigError::BackoffBaseDelay);
        }
        if self.pool_concurrency == 0 {
            return Err(ConfigError::PoolConcurrency);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::PollInterval);
        }
        Ok(())
    }
}

/// Invalid settings detected at startup.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_size must be greater than zero")]
    MaxSize,
    #[error("max_retries must be greater than zero")]
    MaxRetries,
    #[error("backoff_base_delay must be greater than zero")]
    BackoffBaseDelay,
    #[error("pool_concurrency must be greater than zero")]
    PoolConcurrency,
    #[error("poll_interval must be greater than zero")]
    PollInterval,
}

/// Exponential backoff with a hard retry budget:
/// `delay = base_delay * 2^(attempts - 1)`, so 10s/20s/40s at the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.backoff_base_delay,
        }
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retries
    }

    /// Delay before the retry following the given (1-based) failed attempt.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(2u32.saturating_pow(exponent))
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(QueueConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validation_rejects_non_positive_settings() {
        let mut config = QueueConfig::default();
        config.max_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::MaxSize));

        let mut config = QueueConfig::default();
        config.max_retries = 0;
        assert_eq!(config.validate(), Err(ConfigError::MaxRetries));

        let mut config = QueueConfig::default();
        config.backoff_base_delay = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::BackoffBaseDelay));

        let mut config = QueueConfig::default();
        config.pool_concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::PoolConcurrency));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            base_delay: Duration::from_secs(u64::MAX / 2),
        };
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
    }
}
