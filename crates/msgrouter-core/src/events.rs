//! Typed events for hooking into the processing chain.
//!
//! The retry and timeout middlewares, as well as the router itself, report
//! what they do through events. Listeners are registered on the builders and
//! called synchronously on the task processing the message, so they should
//! return quickly.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// An observation emitted while processing a message.
pub trait MiddlewareEvent: Send + Sync + fmt::Debug {
    /// Short, stable kind of the event such as `"retry"` or `"timeout"`.
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// Handler on whose behalf the event was emitted.
    fn handler_name(&self) -> &str;
}

/// Receives events of type `E`.
pub trait EventListener<E: MiddlewareEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// Listeners attached to one middleware instance.
///
/// Cloning is cheap: the listeners themselves are shared.
pub struct EventListeners<E: MiddlewareEvent> {
    registered: Vec<BoxedEventListener<E>>,
}

impl<E: MiddlewareEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.registered.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener in registration order.
    ///
    /// A listener that panics is skipped; the panic never reaches the message
    /// being processed.
    pub fn emit(&self, event: &E) {
        for listener in &self.registered {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
                tracing::warn!(
                    event_type = event.event_type(),
                    handler = event.handler_name(),
                    "event listener panicked"
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }
}

impl<E: MiddlewareEvent> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            registered: self.registered.clone(),
        }
    }
}

impl<E: MiddlewareEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: MiddlewareEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventListeners({})", self.registered.len())
    }
}

/// Adapts a closure into an [`EventListener`].
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    callback: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _event: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: MiddlewareEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.callback)(event)
    }
}
