//! Tower layer for the timeout guard.

use crate::config::TimeoutConfig;
use crate::TimeoutGuard;
use std::sync::Arc;
use tower::layer::Layer;

/// A Tower layer that bounds each handler invocation with a context deadline.
#[derive(Clone)]
pub struct TimeoutLayer {
    config: Arc<TimeoutConfig>,
}

impl TimeoutLayer {
    pub(crate) fn new(config: impl Into<Arc<TimeoutConfig>>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// Creates a new builder for configuring a timeout layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use msgrouter_timeout::TimeoutLayer;
    /// use std::time::Duration;
    ///
    /// let layer = TimeoutLayer::builder()
    ///     .processing_timeout(Duration::from_secs(30))
    ///     .build();
    /// ```
    pub fn builder() -> crate::TimeoutConfigBuilder {
        TimeoutConfig::builder()
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }
}

impl From<TimeoutConfig> for TimeoutLayer {
    fn from(config: TimeoutConfig) -> Self {
        Self::new(config)
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutGuard<S>;

    fn layer(&self, service: S) -> Self::Service {
        TimeoutGuard::new(service, Arc::clone(&self.config))
    }
}
