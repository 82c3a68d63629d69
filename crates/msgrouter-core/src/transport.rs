//! Transport collaborator interfaces.
//!
//! The router never talks to a broker directly. It subscribes through a
//! [`Subscriber`] and publishes (dead letters) through a [`Publisher`].
//! Partitioning, offset commits and reconnection are the transport's business;
//! the only contract is that a delivered message is settled through
//! [`Message::ack`] or [`Message::nack`] once processing finishes.

use crate::error::TransportError;
use crate::message::Message;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// Stream of messages delivered for one subscription.
pub type MessageStream = BoxStream<'static, Message>;

/// Consumes messages from topics.
pub trait Subscriber: Send + Sync {
    /// Subscribes to `topic`. The stream ends when the subscriber is closed.
    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<MessageStream, TransportError>>;

    /// Stops all subscriptions and releases resources.
    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Publishes messages to topics.
pub trait Publisher: Send + Sync {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        messages: Vec<Message>,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}
