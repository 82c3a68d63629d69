//! Consumer configuration consumed by [`Router::new`](crate::Router::new).
//!
//! Invalid combinations are rejected by [`ConsumerConfig::validate`] when the
//! router is constructed, never while messages are being processed.

use msgrouter_retry::RetryConfigBuilder;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors reported by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("retry: max elapsed time requires max retries to be greater than zero")]
    ElapsedTimeWithoutRetries,

    #[error("retry: initial interval must be greater than zero")]
    ZeroInitialInterval,

    #[error("retry: initial interval ({initial:?}) must not exceed max interval ({max:?})")]
    InitialIntervalExceedsMax { initial: Duration, max: Duration },

    #[error("dlq: topic is required when the dead-letter queue is enabled")]
    MissingDlqTopic,

    #[error("consumer group name is required")]
    MissingConsumerGroup,
}

/// Exponential backoff settings for failed messages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RetryConfiguration {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: usize,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Total time budget measured from the first attempt. Zero is unbounded.
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            max_elapsed_time: Duration::ZERO,
        }
    }
}

impl RetryConfiguration {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    pub fn enabled(&self) -> bool {
        self.max_retries > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled() {
            if !self.max_elapsed_time.is_zero() {
                return Err(ConfigError::ElapsedTimeWithoutRetries);
            }
            return Ok(());
        }

        if self.initial_interval.is_zero() {
            return Err(ConfigError::ZeroInitialInterval);
        }

        if self.initial_interval > self.max_interval {
            return Err(ConfigError::InitialIntervalExceedsMax {
                initial: self.initial_interval,
                max: self.max_interval,
            });
        }

        Ok(())
    }

    /// Seeds a retry layer builder with these settings.
    pub(crate) fn layer_builder(&self) -> RetryConfigBuilder {
        RetryConfigBuilder::new()
            .max_retries(self.max_retries)
            .initial_interval(self.initial_interval)
            .max_interval(self.max_interval)
            .max_elapsed_time(Some(self.max_elapsed_time))
    }
}

/// Dead-letter queue settings.
///
/// Topic provisioning (partitions, retention) happens outside the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DlqConfig {
    pub enabled: bool,
    pub topic: String,
}

impl DlqConfig {
    /// An enabled dead-letter queue publishing to `topic`.
    pub fn enabled(topic: impl Into<String>) -> Self {
        Self {
            enabled: true,
            topic: topic.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.topic.trim().is_empty() {
            return Err(ConfigError::MissingDlqTopic);
        }
        Ok(())
    }
}

/// Configuration of one consumer (one router).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ConsumerConfig {
    /// Deadline of a single handler invocation. Zero disables the guard.
    pub processing_timeout: Duration,
    pub retry: RetryConfiguration,
    pub consumer_group_name: String,
    pub dlq: DlqConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            processing_timeout: Duration::from_secs(30),
            retry: RetryConfiguration::default(),
            consumer_group_name: "default".to_string(),
            dlq: DlqConfig::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfiguration) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_consumer_group_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_group_name = name.into();
        self
    }

    pub fn with_dlq(mut self, dlq: DlqConfig) -> Self {
        self.dlq = dlq;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.dlq.validate()?;

        if self.consumer_group_name.trim().is_empty() {
            return Err(ConfigError::MissingConsumerGroup);
        }

        Ok(())
    }
}
