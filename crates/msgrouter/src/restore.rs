//! Context restoration around handler invocations.

use futures::future::BoxFuture;
use msgrouter_core::{HandlerError, Message, MessageContext};
use std::task::{Context, Poll};
use tower::layer::Layer;
use tower::Service;

/// A Tower layer that puts the message context back after every invocation.
///
/// Inner middlewares swap the message context (the timeout guard installs a
/// bounded one, for example). The restorer captures the context on entry and
/// reinstalls it on exit, whether the handler succeeded, failed, or its
/// future was dropped, so redeliveries of the same message object never see
/// a context left over from a previous invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreContextLayer;

impl RestoreContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RestoreContextLayer {
    type Service = RestoreContext<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RestoreContext { inner }
    }
}

/// Service produced by [`RestoreContextLayer`].
#[derive(Debug, Clone)]
pub struct RestoreContext<S> {
    inner: S,
}

impl<S> Service<Message> for RestoreContext<S>
where
    S: Service<Message, Response = (), Error = HandlerError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = HandlerError;
    type Future = BoxFuture<'static, Result<(), HandlerError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, msg: Message) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let restore = Restore {
            captured: Some(msg.context()),
            msg: msg.clone(),
        };

        Box::pin(async move {
            let _restore = restore;
            inner.call(msg).await
        })
    }
}

struct Restore {
    msg: Message,
    captured: Option<MessageContext>,
}

impl Drop for Restore {
    fn drop(&mut self) {
        if let Some(ctx) = self.captured.take() {
            self.msg.set_context(ctx);
        }
    }
}
