//! Core infrastructure for msgrouter.
//!
//! This crate provides the pieces every processing middleware shares:
//! - [`Message`] and its per-delivery [`MessageContext`]
//! - the [`HandlerError`] taxonomy and the [`classify`] severity classifier
//! - [`Handler`], [`Middleware`] and [`MiddlewareChain`] for ordered composition
//! - transport collaborator traits ([`Publisher`], [`Subscriber`])
//! - injected telemetry handles ([`MetricMeter`], [`Logger`])
//! - the event system used for observability

pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod telemetry;
pub mod transport;

pub use context::{MessageContext, CONSUMER_GROUP_KEY, HANDLER_NAME_KEY, TOPIC_KEY};
pub use error::{classify, HandlerError, Severity, SharedError, TransportError};
pub use events::{EventListener, EventListeners, FnListener, MiddlewareEvent};
pub use handler::{boxed, handler_fn, Handler, HandlerInfo};
pub use message::{Delivery, Message, Metadata, EVENT_TYPE_KEY, PARTITION_KEY};
pub use middleware::{Middleware, MiddlewareChain};
pub use telemetry::{Logger, MetricMeter};
pub use transport::{MessageStream, Publisher, Subscriber};
