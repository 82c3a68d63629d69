//! Ordered middleware composition.
//!
//! A [`Middleware`] is a named transform from [`Handler`] to [`Handler`].
//! A [`MiddlewareChain`] is an explicit list of them, outermost first, applied
//! when a handler is registered. Because each entry is a plain value, the
//! ordering is visible and every middleware can be exercised on its own.
//!
//! ```
//! use msgrouter_core::{handler_fn, HandlerInfo, Middleware, MiddlewareChain};
//! use tower::layer::util::Identity;
//!
//! let chain = MiddlewareChain::new()
//!     .with(Middleware::layer("first", Identity::new()))
//!     .with(Middleware::layer("second", Identity::new()));
//!
//! assert_eq!(chain.names(), vec!["first", "second"]);
//!
//! let handler = chain.apply(
//!     handler_fn(|_msg| async { Ok(()) }),
//!     &HandlerInfo::new("ingest", "events"),
//! );
//! # drop(handler);
//! ```

use crate::error::HandlerError;
use crate::handler::{Handler, HandlerInfo};
use crate::message::Message;
use std::fmt;
use std::sync::Arc;
use tower::util::BoxCloneService;
use tower::{Layer, Service};

type WrapFn = dyn Fn(Handler, &HandlerInfo) -> Handler + Send + Sync;

/// A named handler transform.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    wrap: Arc<WrapFn>,
}

impl Middleware {
    /// Creates a middleware from a function that may inspect the handler identity.
    pub fn new<F>(name: &'static str, wrap: F) -> Self
    where
        F: Fn(Handler, &HandlerInfo) -> Handler + Send + Sync + 'static,
    {
        Self {
            name,
            wrap: Arc::new(wrap),
        }
    }

    /// Creates a middleware from a Tower layer that ignores the handler identity.
    pub fn layer<L>(name: &'static str, layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Message, Response = (), Error = HandlerError> + Clone + Send + 'static,
        <L::Service as Service<Message>>::Future: Send + 'static,
    {
        Self::new(name, move |handler, _info| {
            BoxCloneService::new(layer.layer(handler))
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn wrap(&self, handler: Handler, info: &HandlerInfo) -> Handler {
        (self.wrap)(handler, info)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .finish()
    }
}

/// Middleware applied in order, outermost first.
#[derive(Clone, Debug, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` as the new innermost entry.
    pub fn with(mut self, middleware: Middleware) -> Self {
        self.push(middleware);
        self
    }

    /// Appends `middleware` as the new innermost entry.
    pub fn push(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(Middleware::name).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Wraps `handler` so the first middleware sees each message first.
    pub fn apply(&self, handler: Handler, info: &HandlerInfo) -> Handler {
        self.middlewares
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware.wrap(inner, info))
    }
}
