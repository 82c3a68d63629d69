//! Exponential-backoff retry with dead-letter quarantine for msgrouter handlers.
//!
//! [`Retry`] re-invokes the inner handler after each failure, waiting an
//! exponentially growing delay between attempts, until the handler succeeds
//! or the budget is consumed. The budget is the number of retries after the
//! first attempt, optionally bounded by the total time spent on the message.
//!
//! Once the budget is consumed the message is *poisoned*:
//! - with a dead-letter topic configured, a copy annotated with the failure
//!   reason is published there and the call succeeds, so the original is
//!   acknowledged;
//! - without one, the last error is returned (wrapped in
//!   [`HandlerError::Poisoned`] when retries were attempted).
//!
//! If the message context is cancelled (shutdown), the controller stops
//! immediately and returns an error without quarantining, so the transport
//! redelivers the message later. An elapsed processing deadline is not a
//! cancellation: the failed attempt counts against the budget like any other.
//!
//! ## Example
//!
//! ```rust
//! use msgrouter_core::{handler_fn, HandlerError, Message};
//! use msgrouter_retry::RetryLayer;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tower::{Layer, ServiceExt};
//!
//! # async fn example() {
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//!
//! let layer = RetryLayer::builder()
//!     .max_retries(3)
//!     .initial_interval(Duration::from_millis(10))
//!     .on_retry(|retry, delay| println!("retry #{retry} in {delay:?}"))
//!     .build();
//!
//! let handler = layer.layer(handler_fn(move |_msg: Message| {
//!     let counter = Arc::clone(&counter);
//!     async move {
//!         if counter.fetch_add(1, Ordering::SeqCst) < 2 {
//!             Err(HandlerError::failed("upstream unavailable"))
//!         } else {
//!             Ok(())
//!         }
//!     }
//! }));
//!
//! handler.oneshot(Message::new("payload")).await.unwrap();
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! # }
//! ```

use futures::future::BoxFuture;
use msgrouter_core::{HandlerError, Message, HANDLER_NAME_KEY};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::{Service, ServiceExt};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

pub use backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use layer::RetryLayer;
pub use poison::{
    PoisonQueue, POISONED_ATTEMPTS_KEY, POISONED_HANDLER_KEY, POISONED_TOPIC_KEY,
    REASON_POISONED_KEY,
};
pub use policy::RetryPolicy;

mod backoff;
mod config;
mod events;
mod layer;
mod poison;
mod policy;

/// A Tower service that retries failed messages and quarantines poisoned ones.
#[derive(Clone)]
pub struct Retry<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S> Retry<S> {
    pub(crate) fn new(inner: S, config: Arc<RetryConfig>) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "retry_calls_total",
                "Total number of messages that went through the retry controller, by outcome"
            );
            describe_counter!(
                "retry_attempts_total",
                "Total number of retries scheduled after a failed attempt"
            );
        }

        Self { inner, config }
    }
}

impl<S> Service<Message> for Retry<S>
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
        let mut service = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let handler_name = msg
                .context()
                .attribute(HANDLER_NAME_KEY)
                .unwrap_or(config.name.as_str())
                .to_string();
            let outcome = Outcome::new(&config, &handler_name);

            let start = Instant::now();
            let mut attempts = 1;

            loop {
                let err = match service.ready().await?.call(msg.clone()).await {
                    Ok(()) => {
                        outcome.success(attempts);
                        return Ok(());
                    }
                    Err(err) => err,
                };

                // Only cancellation stops retrying. An elapsed deadline is an
                // ordinary failure and goes through the retry budget.
                let cancellation = msg.context().cancellation_token().clone();
                if cancellation.is_cancelled() {
                    outcome.cancelled(attempts);
                    return Err(err);
                }

                let delay = config.policy.next_backoff(attempts);
                if config.policy.allows(attempts, start.elapsed().saturating_add(delay)) {
                    outcome.retry(attempts, delay, &err);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancellation.cancelled() => {
                            outcome.cancelled(attempts);
                            return Err(HandlerError::Cancelled);
                        }
                    }

                    attempts += 1;
                    continue;
                }

                outcome.exhausted(attempts, start.elapsed(), &err);

                let Some(queue) = &config.poison_queue else {
                    return Err(if attempts > 1 {
                        HandlerError::Poisoned {
                            attempts,
                            source: Box::new(err),
                        }
                    } else {
                        err
                    });
                };

                return match queue.quarantine(&msg, &err, attempts).await {
                    Ok(()) => {
                        outcome.poisoned(attempts, queue.topic());
                        Ok(())
                    }
                    Err(publish_err) => {
                        outcome.poison_failed(queue.topic(), &publish_err);
                        Err(HandlerError::Transport(publish_err))
                    }
                };
            }
        })
    }
}

/// Reports state transitions of one message to listeners, metrics and logs.
struct Outcome<'a> {
    config: &'a RetryConfig,
    handler_name: &'a str,
}

impl<'a> Outcome<'a> {
    fn new(config: &'a RetryConfig, handler_name: &'a str) -> Self {
        Self {
            config,
            handler_name,
        }
    }

    fn retry(&self, attempt: usize, delay: std::time::Duration, err: &HandlerError) {
        self.config.event_listeners.emit(&RetryEvent::Retry {
            handler_name: self.handler_name.to_string(),
            timestamp: std::time::Instant::now(),
            attempt,
            delay,
            error: err.to_string(),
        });

        #[cfg(feature = "metrics")]
        counter!("retry_attempts_total", "handler" => self.handler_name.to_string()).increment(1);

        #[cfg(feature = "tracing")]
        debug!(
            handler = %self.handler_name,
            retry = attempt,
            delay_ms = delay.as_millis(),
            error = %err,
            "retrying message"
        );
    }

    fn success(&self, attempts: usize) {
        self.config.event_listeners.emit(&RetryEvent::Success {
            handler_name: self.handler_name.to_string(),
            timestamp: std::time::Instant::now(),
            attempts,
        });
        self.count("success");

        #[cfg(feature = "tracing")]
        if attempts > 1 {
            debug!(handler = %self.handler_name, attempts, "message succeeded after retry");
        }
    }

    fn exhausted(&self, attempts: usize, elapsed: std::time::Duration, err: &HandlerError) {
        self.config.event_listeners.emit(&RetryEvent::Exhausted {
            handler_name: self.handler_name.to_string(),
            timestamp: std::time::Instant::now(),
            attempts,
            elapsed,
        });
        self.count("exhausted");

        #[cfg(feature = "tracing")]
        if attempts > 1 {
            warn!(
                handler = %self.handler_name,
                attempts,
                elapsed_ms = elapsed.as_millis(),
                error = %err,
                "retry budget exhausted"
            );
        }
        #[cfg(not(feature = "tracing"))]
        let _ = err;
    }

    fn poisoned(&self, attempts: usize, topic: &str) {
        self.config.event_listeners.emit(&RetryEvent::Poisoned {
            handler_name: self.handler_name.to_string(),
            timestamp: std::time::Instant::now(),
            attempts,
            topic: topic.to_string(),
        });
        self.count("poisoned");

        #[cfg(feature = "tracing")]
        debug!(handler = %self.handler_name, topic, "message moved to dead-letter topic");
    }

    fn poison_failed(&self, topic: &str, err: &msgrouter_core::TransportError) {
        self.config.event_listeners.emit(&RetryEvent::PoisonFailed {
            handler_name: self.handler_name.to_string(),
            timestamp: std::time::Instant::now(),
            topic: topic.to_string(),
            error: err.to_string(),
        });
        self.count("poison_failed");

        #[cfg(feature = "tracing")]
        warn!(handler = %self.handler_name, topic, error = %err, "dead-letter publish failed");
    }

    fn cancelled(&self, attempts: usize) {
        self.config.event_listeners.emit(&RetryEvent::Cancelled {
            handler_name: self.handler_name.to_string(),
            timestamp: std::time::Instant::now(),
            attempts,
        });
        self.count("cancelled");

        #[cfg(feature = "tracing")]
        debug!(handler = %self.handler_name, attempts, "message context cancelled");
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn count(&self, result: &'static str) {
        #[cfg(feature = "metrics")]
        counter!(
            "retry_calls_total",
            "handler" => self.handler_name.to_string(),
            "result" => result
        )
        .increment(1);
    }
}
