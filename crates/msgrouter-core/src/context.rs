//! Per-message processing context.
//!
//! A [`MessageContext`] travels with a [`Message`](crate::Message) through the
//! middleware chain. It carries a cancellation token, an optional processing
//! deadline, and a small set of string attributes (handler name, topic, ...).
//!
//! The context is passive: a deadline does not interrupt anything on its own.
//! Handlers observe expiry by awaiting [`MessageContext::done`] (or wrapping
//! their work in [`MessageContext::until_done`]) and returning the resulting
//! error, exactly like any other failure.

use crate::error::HandlerError;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Attribute holding the name of the handler processing the message.
pub const HANDLER_NAME_KEY: &str = "handler_name";

/// Attribute holding the topic the message was consumed from.
pub const TOPIC_KEY: &str = "topic";

/// Attribute holding the consumer group of the router.
pub const CONSUMER_GROUP_KEY: &str = "consumer_group";

/// Cancellation scope, deadline and attributes attached to a message.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    attributes: BTreeMap<String, String>,
}

impl MessageContext {
    /// Creates a context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context cancelled together with `token`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Derives a child context whose deadline is at most `timeout` from now.
    ///
    /// The returned [`DropGuard`] cancels the child scope when dropped, so the
    /// caller bounds the lifetime of everything derived from the child. The
    /// parent scope is never cancelled by the child.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, DropGuard) {
        let requested = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < requested => existing,
            _ => requested,
        };

        let token = self.token.child_token();
        let guard = token.clone().drop_guard();

        let child = Self {
            token,
            deadline: Some(deadline),
            attributes: self.attributes.clone(),
        };
        (child, guard)
    }

    /// Returns a copy of this context with an additional attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once the deadline has passed.
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns true if the scope was cancelled or the deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline_exceeded()
    }

    /// Reports why the context is done, if it is.
    ///
    /// An elapsed deadline wins over an explicit cancellation.
    pub fn err(&self) -> Option<HandlerError> {
        if self.deadline_exceeded() {
            Some(HandlerError::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(HandlerError::Cancelled)
        } else {
            None
        }
    }

    /// Waits until the context is cancelled or its deadline elapses.
    pub async fn done(&self) -> HandlerError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
        self.err().unwrap_or(HandlerError::Cancelled)
    }

    /// Runs `fut` until it completes or the context is done, whichever is first.
    pub async fn until_done<F>(&self, fut: F) -> Result<F::Output, HandlerError>
    where
        F: Future,
    {
        tokio::select! {
            output = fut => Ok(output),
            err = self.done() => Err(err),
        }
    }
}
