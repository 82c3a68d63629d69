use msgrouter_core::{MiddlewareEvent, Severity};
use std::time::Instant;

/// Events emitted by the router.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A handler subscribed to its topic and started consuming.
    HandlerStarted {
        handler_name: String,
        timestamp: Instant,
        topic: String,
    },
    /// A message was processed and acknowledged.
    MessageAcked {
        handler_name: String,
        timestamp: Instant,
        message_uuid: String,
    },
    /// A message failed and was handed back to the transport.
    MessageNacked {
        handler_name: String,
        timestamp: Instant,
        message_uuid: String,
        severity: Severity,
        error: String,
    },
    /// A handler stopped consuming.
    HandlerStopped {
        handler_name: String,
        timestamp: Instant,
    },
}

impl MiddlewareEvent for RouterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RouterEvent::HandlerStarted { .. } => "handler_started",
            RouterEvent::MessageAcked { .. } => "message_acked",
            RouterEvent::MessageNacked { .. } => "message_nacked",
            RouterEvent::HandlerStopped { .. } => "handler_stopped",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RouterEvent::HandlerStarted { timestamp, .. }
            | RouterEvent::MessageAcked { timestamp, .. }
            | RouterEvent::MessageNacked { timestamp, .. }
            | RouterEvent::HandlerStopped { timestamp, .. } => *timestamp,
        }
    }

    fn handler_name(&self) -> &str {
        match self {
            RouterEvent::HandlerStarted { handler_name, .. }
            | RouterEvent::MessageAcked { handler_name, .. }
            | RouterEvent::MessageNacked { handler_name, .. }
            | RouterEvent::HandlerStopped { handler_name, .. } => handler_name,
        }
    }
}
