//! Per-message processing deadline for msgrouter handlers.
//!
//! The guard derives a child [`MessageContext`] with a deadline before
//! invoking the inner service and cancels it once the service returns. Placed
//! around the retry controller, one deadline bounds every attempt of a
//! message. The guard never drops or aborts the inner future: a handler that
//! runs past its deadline is expected to notice through
//! [`MessageContext::done`] and return an error, which the retry controller
//! counts like any other failure.
//!
//! A zero processing timeout turns the guard into a passthrough.
//!
//! ## Example
//!
//! ```rust
//! use msgrouter_core::{handler_fn, HandlerError, Message};
//! use msgrouter_timeout::TimeoutLayer;
//! use std::time::Duration;
//! use tower::{Layer, ServiceExt};
//!
//! # async fn example() {
//! let layer = TimeoutLayer::builder()
//!     .processing_timeout(Duration::from_millis(50))
//!     .on_timeout(|elapsed| eprintln!("handler overran its deadline ({elapsed:?})"))
//!     .build();
//!
//! let handler = layer.layer(handler_fn(|msg: Message| async move {
//!     // Blocks until the deadline cancels the context.
//!     Err::<(), HandlerError>(msg.context().done().await)
//! }));
//!
//! let err = handler.oneshot(Message::new("payload")).await.unwrap_err();
//! assert!(err.is_timeout());
//! # }
//! ```

use futures::future::BoxFuture;
use msgrouter_core::{HandlerError, Message, MessageContext, HANDLER_NAME_KEY};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

pub use config::{TimeoutConfig, TimeoutConfigBuilder};
pub use events::TimeoutEvent;
pub use layer::TimeoutLayer;

mod config;
mod events;
mod layer;

/// A Tower service that bounds each invocation of the inner handler with a deadline.
#[derive(Clone)]
pub struct TimeoutGuard<S> {
    inner: S,
    config: Arc<TimeoutConfig>,
}

impl<S> TimeoutGuard<S> {
    pub(crate) fn new(inner: S, config: Arc<TimeoutConfig>) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "timeout_calls_total",
                "Total number of handler invocations under a processing deadline"
            );
            describe_histogram!(
                "timeout_call_duration_seconds",
                "Duration of handler invocations under a processing deadline"
            );
        }

        Self { inner, config }
    }
}

impl<S> Service<Message> for TimeoutGuard<S>
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

        if self.config.is_disabled() {
            return Box::pin(inner.call(msg));
        }

        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let timeout = config.processing_timeout;
            let base = msg.context();
            let handler_name = base
                .attribute(HANDLER_NAME_KEY)
                .unwrap_or(config.name.as_str())
                .to_string();

            let (bounded, cancel) = base.with_timeout(timeout);
            msg.set_context(bounded.clone());

            let start = Instant::now();
            let result = inner.call(msg.clone()).await;
            let duration = start.elapsed();

            // Cancel the bounded scope and hand the caller's context back, so
            // a redelivery derives a fresh deadline.
            drop(cancel);
            msg.set_context(base);

            emit_outcome(&config, &handler_name, &bounded, &result, duration);
            result
        })
    }
}

fn emit_outcome(
    config: &TimeoutConfig,
    handler_name: &str,
    bounded: &MessageContext,
    result: &Result<(), HandlerError>,
    duration: std::time::Duration,
) {
    let timestamp = std::time::Instant::now();

    match result {
        Ok(()) => {
            config.event_listeners.emit(&TimeoutEvent::Success {
                handler_name: handler_name.to_string(),
                timestamp,
                duration,
            });

            #[cfg(feature = "metrics")]
            {
                counter!("timeout_calls_total", "handler" => handler_name.to_string(), "result" => "success").increment(1);
                histogram!("timeout_call_duration_seconds", "handler" => handler_name.to_string())
                    .record(duration.as_secs_f64());
            }

            #[cfg(feature = "tracing")]
            debug!(
                handler = %handler_name,
                duration_ms = duration.as_millis(),
                "handler completed within deadline"
            );
        }
        Err(_) if bounded.deadline_exceeded() => {
            config.event_listeners.emit(&TimeoutEvent::Timeout {
                handler_name: handler_name.to_string(),
                timestamp,
                elapsed: duration,
                processing_timeout: config.processing_timeout,
            });

            #[cfg(feature = "metrics")]
            {
                counter!("timeout_calls_total", "handler" => handler_name.to_string(), "result" => "timeout").increment(1);
            }

            #[cfg(feature = "tracing")]
            warn!(
                handler = %handler_name,
                timeout_ms = config.processing_timeout.as_millis(),
                elapsed_ms = duration.as_millis(),
                "handler exceeded processing deadline"
            );
        }
        Err(_) => {
            config.event_listeners.emit(&TimeoutEvent::Error {
                handler_name: handler_name.to_string(),
                timestamp,
                duration,
            });

            #[cfg(feature = "metrics")]
            {
                counter!("timeout_calls_total", "handler" => handler_name.to_string(), "result" => "error").increment(1);
                histogram!("timeout_call_duration_seconds", "handler" => handler_name.to_string())
                    .record(duration.as_secs_f64());
            }
        }
    }
}
