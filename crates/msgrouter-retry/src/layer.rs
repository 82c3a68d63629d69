use crate::config::RetryConfig;
use crate::Retry;
use std::sync::Arc;
use tower::layer::Layer;

/// A Tower layer that retries failed handler invocations and quarantines
/// messages that exhaust their budget.
#[derive(Clone)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    pub(crate) fn new(config: impl Into<Arc<RetryConfig>>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// Creates a new builder for configuring a retry layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use msgrouter_retry::RetryLayer;
    /// use std::time::Duration;
    ///
    /// let layer = RetryLayer::builder()
    ///     .max_retries(5)
    ///     .initial_interval(Duration::from_millis(100))
    ///     .max_interval(Duration::from_secs(1))
    ///     .build();
    /// ```
    pub fn builder() -> crate::RetryConfigBuilder {
        RetryConfig::builder()
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl From<RetryConfig> for RetryLayer {
    fn from(config: RetryConfig) -> Self {
        Self::new(config)
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, Arc::clone(&self.config))
    }
}
