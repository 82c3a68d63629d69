use crate::backoff::{Backoff, ExponentialBackoff};
use crate::events::RetryEvent;
use crate::poison::PoisonQueue;
use crate::policy::RetryPolicy;
use msgrouter_core::{EventListeners, FnListener, Publisher};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the retry controller.
pub struct RetryConfig {
    pub(crate) policy: RetryPolicy,
    pub(crate) poison_queue: Option<PoisonQueue>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dead-letter topic, when quarantine is enabled.
    pub fn dead_letter_topic(&self) -> Option<&str> {
        self.poison_queue.as_ref().map(PoisonQueue::topic)
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    max_retries: usize,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_elapsed_time: Option<Duration>,
    backoff: Option<Arc<dyn Backoff>>,
    poison_queue: Option<PoisonQueue>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_retries: 0 (a failure is final)
    /// - initial_interval: 100ms, doubling up to max_interval: 1s
    /// - max_elapsed_time: unbounded
    /// - no dead-letter topic
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_retries: 0,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            backoff: None,
            poison_queue: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the number of retries after the first attempt.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Growth factor between consecutive delays. Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Spreads each delay by up to this fraction in both directions. Default: 0.0
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Caps the total time spent on one message, measured from its first attempt.
    ///
    /// `None` or zero means unbounded.
    pub fn max_elapsed_time(mut self, max_elapsed_time: Option<Duration>) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    /// Replaces the exponential schedule with a custom backoff.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Backoff + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Quarantines exhausted messages on `topic` through `publisher`.
    pub fn dead_letter(mut self, publisher: Arc<dyn Publisher>, topic: impl Into<String>) -> Self {
        self.poison_queue = Some(PoisonQueue::new(publisher, topic));
        self
    }

    /// Sets the name used in events when the message carries no handler name.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked before each retry with the 1-based retry
    /// number and the delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked on success with the number of attempts.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when the retry budget is consumed.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked after a message was published to the
    /// dead-letter topic.
    pub fn on_poisoned<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Poisoned { topic, .. } = event {
                f(topic);
            }
        }));
        self
    }

    /// Registers a callback invoked when the message context is cancelled
    /// mid-processing.
    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Cancelled { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn build_config(self) -> RetryConfig {
        let backoff = self.backoff.unwrap_or_else(|| {
            Arc::new(
                ExponentialBackoff::new(self.initial_interval)
                    .multiplier(self.multiplier)
                    .max_interval(self.max_interval)
                    .randomization_factor(self.randomization_factor),
            )
        });

        RetryConfig {
            policy: RetryPolicy::new(self.max_retries, backoff)
                .with_max_elapsed_time(self.max_elapsed_time),
            poison_queue: self.poison_queue,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    /// Builds the retry layer.
    pub fn build(self) -> crate::RetryLayer {
        crate::RetryLayer::new(self.build_config())
    }
}
