use msgrouter_core::{Logger, MetricMeter, EVENT_TYPE_KEY};

/// Where and how a metrics middleware reports.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub(crate) meter: MetricMeter,
    pub(crate) prefix: String,
    pub(crate) logger: Logger,
    pub(crate) event_type_key: String,
}

impl MetricsConfig {
    /// Creates a configuration reporting under `prefix`.
    ///
    /// The event type label is read from the `ce_type` metadata key.
    pub fn new(meter: MetricMeter, prefix: impl Into<String>, logger: Logger) -> Self {
        Self {
            meter,
            prefix: prefix.into(),
            logger,
            event_type_key: EVENT_TYPE_KEY.to_string(),
        }
    }

    /// Reads the event type label from `key` instead of `ce_type`.
    pub fn with_event_type_key(mut self, key: impl Into<String>) -> Self {
        self.event_type_key = key.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn event_type_key(&self) -> &str {
        &self.event_type_key
    }
}
