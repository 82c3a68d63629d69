use msgrouter_core::MiddlewareEvent;
use std::time::{Duration, Instant};

/// Events emitted by the retry controller.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is scheduled after `delay`.
    Retry {
        handler_name: String,
        timestamp: Instant,
        /// 1-based retry number.
        attempt: usize,
        delay: Duration,
        error: String,
    },
    /// The handler succeeded (either on the first attempt or after retries).
    Success {
        handler_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The retry or elapsed-time budget is consumed.
    Exhausted {
        handler_name: String,
        timestamp: Instant,
        attempts: usize,
        elapsed: Duration,
    },
    /// An exhausted message was published to the dead-letter topic.
    Poisoned {
        handler_name: String,
        timestamp: Instant,
        attempts: usize,
        topic: String,
    },
    /// Publishing to the dead-letter topic failed.
    PoisonFailed {
        handler_name: String,
        timestamp: Instant,
        topic: String,
        error: String,
    },
    /// The message context was cancelled while processing or backing off.
    Cancelled {
        handler_name: String,
        timestamp: Instant,
        attempts: usize,
    },
}

impl MiddlewareEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::Poisoned { .. } => "poisoned",
            RetryEvent::PoisonFailed { .. } => "poison_failed",
            RetryEvent::Cancelled { .. } => "cancelled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::Poisoned { timestamp, .. }
            | RetryEvent::PoisonFailed { timestamp, .. }
            | RetryEvent::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    fn handler_name(&self) -> &str {
        match self {
            RetryEvent::Retry { handler_name, .. }
            | RetryEvent::Success { handler_name, .. }
            | RetryEvent::Exhausted { handler_name, .. }
            | RetryEvent::Poisoned { handler_name, .. }
            | RetryEvent::PoisonFailed { handler_name, .. }
            | RetryEvent::Cancelled { handler_name, .. } => handler_name,
        }
    }
}
