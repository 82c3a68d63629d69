//! Handler functions.
//!
//! A handler is a Tower [`Service`] from [`Message`] to `()`. Every middleware
//! in the crate family wraps a [`Handler`] and returns a [`Handler`], so chains
//! of arbitrary length share one concrete type.

use crate::error::HandlerError;
use crate::message::Message;
use std::future::Future;
use tower::util::BoxCloneService;
use tower::Service;

/// Type-erased, cloneable message handler.
pub type Handler = BoxCloneService<Message, (), HandlerError>;

/// Builds a [`Handler`] from an async function.
///
/// ```
/// use msgrouter_core::{handler_fn, HandlerError, Message};
///
/// let handler = handler_fn(|msg: Message| async move {
///     if msg.payload().is_empty() {
///         return Err(HandlerError::failed("empty payload"));
///     }
///     Ok(())
/// });
/// # drop(handler);
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Message) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    BoxCloneService::new(tower::service_fn(f))
}

/// Erases the type of any compatible service.
pub fn boxed<S>(service: S) -> Handler
where
    S: Service<Message, Response = (), Error = HandlerError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    BoxCloneService::new(service)
}

/// Identity of the handler a middleware is being applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    name: String,
    topic: String,
}

impl HandlerInfo {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
