use crate::config::MetricsConfig;
use crate::{Measured, MetricsKind};
use msgrouter_core::{Logger, MetricMeter};
use std::sync::Arc;
use tower::layer::Layer;

/// Instruments business handlers.
#[derive(Clone)]
pub struct HandlerMetricsLayer {
    config: Arc<MetricsConfig>,
}

impl HandlerMetricsLayer {
    pub fn new(meter: MetricMeter, prefix: impl Into<String>, logger: Logger) -> Self {
        MetricsConfig::new(meter, prefix, logger).into()
    }

    /// Reads the event type label from `key` instead of `ce_type`.
    pub fn event_type_key(self, key: impl Into<String>) -> Self {
        (*self.config).clone().with_event_type_key(key).into()
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }
}

impl From<MetricsConfig> for HandlerMetricsLayer {
    fn from(config: MetricsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for HandlerMetricsLayer {
    type Service = Measured<S>;

    fn layer(&self, service: S) -> Self::Service {
        Measured::new(service, Arc::clone(&self.config), MetricsKind::Handler)
    }
}

/// Instruments the dead-letter sink.
#[derive(Clone)]
pub struct DlqMetricsLayer {
    config: Arc<MetricsConfig>,
}

impl DlqMetricsLayer {
    pub fn new(meter: MetricMeter, prefix: impl Into<String>, logger: Logger) -> Self {
        MetricsConfig::new(meter, prefix, logger).into()
    }

    /// Reads the event type label from `key` instead of `ce_type`.
    pub fn event_type_key(self, key: impl Into<String>) -> Self {
        (*self.config).clone().with_event_type_key(key).into()
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }
}

impl From<MetricsConfig> for DlqMetricsLayer {
    fn from(config: MetricsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for DlqMetricsLayer {
    type Service = Measured<S>;

    fn layer(&self, service: S) -> Self::Service {
        Measured::new(service, Arc::clone(&self.config), MetricsKind::DeadLetter)
    }
}
