//! Dead-letter quarantine of exhausted messages.

use msgrouter_core::{
    HandlerError, Message, Publisher, TransportError, HANDLER_NAME_KEY, TOPIC_KEY,
};
use std::fmt;
use std::sync::Arc;

/// Metadata key holding the error that exhausted the retry budget.
pub const REASON_POISONED_KEY: &str = "reason_poisoned";
/// Metadata key holding the topic the message was consumed from.
pub const POISONED_TOPIC_KEY: &str = "poisoned_topic";
/// Metadata key holding the handler that gave up on the message.
pub const POISONED_HANDLER_KEY: &str = "poisoned_handler";
/// Metadata key holding the number of handler invocations.
pub const POISONED_ATTEMPTS_KEY: &str = "poisoned_attempts";

/// Publishes exhausted messages to a dead-letter topic.
#[derive(Clone)]
pub struct PoisonQueue {
    publisher: Arc<dyn Publisher>,
    topic: String,
}

impl PoisonQueue {
    pub fn new(publisher: Arc<dyn Publisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes a copy of `msg` annotated with why and where it failed.
    pub async fn quarantine(
        &self,
        msg: &Message,
        err: &HandlerError,
        attempts: usize,
    ) -> Result<(), TransportError> {
        let ctx = msg.context();
        let poisoned = msg.copy();

        poisoned.set_metadata(REASON_POISONED_KEY, err.to_string());
        poisoned.set_metadata(POISONED_ATTEMPTS_KEY, attempts.to_string());
        if let Some(topic) = ctx.attribute(TOPIC_KEY) {
            poisoned.set_metadata(POISONED_TOPIC_KEY, topic);
        }
        if let Some(handler) = ctx.attribute(HANDLER_NAME_KEY) {
            poisoned.set_metadata(POISONED_HANDLER_KEY, handler);
        }

        self.publisher.publish(&self.topic, vec![poisoned]).await
    }
}

impl fmt::Debug for PoisonQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoisonQueue")
            .field("topic", &self.topic)
            .finish()
    }
}
