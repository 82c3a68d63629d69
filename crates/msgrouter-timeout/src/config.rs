//! Configuration for the timeout guard.

use crate::events::TimeoutEvent;
use msgrouter_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for the timeout guard.
pub struct TimeoutConfig {
    pub(crate) processing_timeout: Duration,
    pub(crate) event_listeners: EventListeners<TimeoutEvent>,
    pub(crate) name: String,
}

impl TimeoutConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TimeoutConfigBuilder {
        TimeoutConfigBuilder::new()
    }

    /// Creates a layer from this configuration.
    pub fn layer(self) -> crate::TimeoutLayer {
        crate::TimeoutLayer::new(self)
    }

    pub fn processing_timeout(&self) -> Duration {
        self.processing_timeout
    }

    /// Returns true when the guard is a passthrough.
    pub fn is_disabled(&self) -> bool {
        self.processing_timeout.is_zero()
    }
}

/// Builder for configuring and constructing a timeout guard.
pub struct TimeoutConfigBuilder {
    processing_timeout: Duration,
    event_listeners: EventListeners<TimeoutEvent>,
    name: String,
}

impl TimeoutConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            processing_timeout: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the per-invocation processing deadline.
    ///
    /// A zero duration disables the guard.
    ///
    /// Default: 30 seconds
    pub fn processing_timeout(mut self, duration: Duration) -> Self {
        self.processing_timeout = duration;
        self
    }

    /// Sets the name used in events when the message carries no handler name.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a handler finishes before its deadline.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeoutEvent::Success { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback invoked when a handler fails before its deadline.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeoutEvent::Error { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback invoked when a handler fails after its deadline elapsed.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeoutEvent::Timeout { elapsed, .. } = event {
                f(*elapsed);
            }
        }));
        self
    }

    /// Builds the timeout layer.
    pub fn build(self) -> crate::TimeoutLayer {
        crate::TimeoutLayer::new(TimeoutConfig {
            processing_timeout: self.processing_timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}

impl Default for TimeoutConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
