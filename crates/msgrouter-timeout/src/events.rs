//! Event types for the timeout guard.

use msgrouter_core::MiddlewareEvent;
use std::time::{Duration, Instant};

/// Events emitted by the timeout guard.
#[derive(Debug, Clone)]
pub enum TimeoutEvent {
    /// The handler succeeded before its deadline.
    Success {
        handler_name: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The handler failed before its deadline.
    Error {
        handler_name: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The handler returned an error after its deadline elapsed.
    Timeout {
        handler_name: String,
        timestamp: Instant,
        /// Time spent in the handler, including the time it took to observe
        /// the cancellation.
        elapsed: Duration,
        processing_timeout: Duration,
    },
}

impl MiddlewareEvent for TimeoutEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TimeoutEvent::Success { .. } => "success",
            TimeoutEvent::Error { .. } => "error",
            TimeoutEvent::Timeout { .. } => "timeout",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            TimeoutEvent::Success { timestamp, .. }
            | TimeoutEvent::Error { timestamp, .. }
            | TimeoutEvent::Timeout { timestamp, .. } => *timestamp,
        }
    }

    fn handler_name(&self) -> &str {
        match self {
            TimeoutEvent::Success { handler_name, .. }
            | TimeoutEvent::Error { handler_name, .. }
            | TimeoutEvent::Timeout { handler_name, .. } => handler_name,
        }
    }
}
