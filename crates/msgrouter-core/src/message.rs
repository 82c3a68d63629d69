//! Messages flowing through the router.

use crate::context::MessageContext;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// String headers attached to a message.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key carrying the event type (CloudEvents `type` attribute).
pub const EVENT_TYPE_KEY: &str = "ce_type";

/// Metadata key carrying the partition/routing key.
pub const PARTITION_KEY: &str = "partition_key";

/// Outcome reported back to the transport once a message has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processing finished; the transport may commit the message.
    Ack,
    /// Processing failed; the transport applies its own redelivery policy.
    Nack,
}

/// A message consumed from or published to a topic.
///
/// `Message` is a handle: clones share metadata, context and acknowledgement
/// state, the same way every middleware layer sees one message object. Use
/// [`Message::copy`] to get an independent message.
#[derive(Clone)]
pub struct Message {
    inner: Arc<Inner>,
}

struct Inner {
    uuid: String,
    payload: Bytes,
    metadata: Mutex<Metadata>,
    context: Mutex<MessageContext>,
    delivery: Mutex<Option<oneshot::Sender<Delivery>>>,
}

impl Message {
    /// Creates a message with a fresh v4 UUID.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_uuid(uuid::Uuid::new_v4().to_string(), payload)
    }

    pub fn with_uuid(uuid: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::from_parts(uuid.into(), payload.into(), Metadata::new())
    }

    fn from_parts(uuid: String, payload: Bytes, metadata: Metadata) -> Self {
        Self {
            inner: Arc::new(Inner {
                uuid,
                payload,
                metadata: Mutex::new(metadata),
                context: Mutex::new(MessageContext::default()),
                delivery: Mutex::new(None),
            }),
        }
    }

    /// Builder-style metadata setter.
    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_metadata(key, value);
        self
    }

    pub fn uuid(&self) -> &str {
        &self.inner.uuid
    }

    pub fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    /// Snapshot of the current metadata.
    pub fn metadata(&self) -> Metadata {
        self.inner.metadata.lock().clone()
    }

    pub fn metadata_value(&self, key: &str) -> Option<String> {
        self.inner.metadata.lock().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.metadata.lock().insert(key.into(), value.into());
    }

    /// Snapshot of the current processing context.
    pub fn context(&self) -> MessageContext {
        self.inner.context.lock().clone()
    }

    /// Replaces the processing context, returning the previous one.
    pub fn set_context(&self, ctx: MessageContext) -> MessageContext {
        std::mem::replace(&mut *self.inner.context.lock(), ctx)
    }

    /// Returns an independent message with the same uuid, payload and metadata.
    ///
    /// The copy starts with an empty context and no delivery tracking.
    pub fn copy(&self) -> Self {
        Self::from_parts(
            self.inner.uuid.clone(),
            self.inner.payload.clone(),
            self.metadata(),
        )
    }

    /// Starts tracking the delivery outcome of this message.
    ///
    /// Called by transports before handing the message to a consumer. Any
    /// previously installed tracker is replaced and its receiver observes a
    /// closed channel.
    pub fn track_delivery(&self) -> oneshot::Receiver<Delivery> {
        let (tx, rx) = oneshot::channel();
        *self.inner.delivery.lock() = Some(tx);
        rx
    }

    /// Acknowledges the message. Returns false if it was already settled or untracked.
    pub fn ack(&self) -> bool {
        self.settle(Delivery::Ack)
    }

    /// Negatively acknowledges the message. Returns false if it was already settled or untracked.
    pub fn nack(&self) -> bool {
        self.settle(Delivery::Nack)
    }

    fn settle(&self, outcome: Delivery) -> bool {
        match self.inner.delivery.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Returns true if both handles point at the same message object.
    pub fn ptr_eq(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("uuid", &self.inner.uuid)
            .field("metadata", &*self.inner.metadata.lock())
            .field("payload_len", &self.inner.payload.len())
            .finish()
    }
}
