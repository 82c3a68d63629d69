//! Metrics middleware for msgrouter handlers.
//!
//! Two independent middlewares record the outcome and latency of every
//! message they see:
//!
//! - [`HandlerMetricsLayer`] wraps business handlers. It records
//!   `<prefix>.message_handler_processing_time_ms` and
//!   `<prefix>.message_handler_message_count`, and logs failures at `warn`:
//!   a single handler failure is expected to be retried.
//! - [`DlqMetricsLayer`] wraps the dead-letter sink. It records
//!   `<prefix>.message_processing_time_ms` and
//!   `<prefix>.message_processing_count`, and logs failures at `error`
//!   (unless the failure classifies as a warning, such as a shutdown
//!   cancellation), since reaching the dead-letter path is terminal.
//!
//! Both label every sample with `event_type` (read from message metadata,
//! `"UNKNOWN"` when absent) and `status` (`success` or `failed`), and both
//! return the inner result unchanged.
//!
//! ## Example
//!
//! ```rust
//! use msgrouter_core::{handler_fn, Logger, Message, MetricMeter};
//! use msgrouter_metrics::HandlerMetricsLayer;
//! use tower::{Layer, ServiceExt};
//!
//! # async fn example() {
//! let layer = HandlerMetricsLayer::new(MetricMeter::global(), "balance_worker", Logger::global());
//! let handler = layer.layer(handler_fn(|_msg| async { Ok(()) }));
//!
//! handler.oneshot(Message::new("payload")).await.unwrap();
//! # }
//! ```

use futures::future::BoxFuture;
use msgrouter_core::{classify, HandlerError, Message, Severity};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::Service;

pub use config::MetricsConfig;
pub use layer::{DlqMetricsLayer, HandlerMetricsLayer};

mod config;
mod layer;

/// Label value used when a message carries no event type.
pub const UNKNOWN_EVENT_TYPE: &str = "UNKNOWN";

/// Which path of the router a [`Measured`] service instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsKind {
    /// Business handlers: failures are expected to be retried.
    Handler,
    /// The dead-letter sink: failures are terminal.
    DeadLetter,
}

impl MetricsKind {
    fn count_metric(&self) -> &'static str {
        match self {
            MetricsKind::Handler => "message_handler_message_count",
            MetricsKind::DeadLetter => "message_processing_count",
        }
    }

    fn time_metric(&self) -> &'static str {
        match self {
            MetricsKind::Handler => "message_handler_processing_time_ms",
            MetricsKind::DeadLetter => "message_processing_time_ms",
        }
    }

    fn severity(&self, err: &HandlerError) -> Severity {
        match self {
            MetricsKind::Handler => Severity::Warning,
            MetricsKind::DeadLetter => classify(err),
        }
    }

    fn description(&self) -> &'static str {
        match self {
            MetricsKind::Handler => "failed to process message",
            MetricsKind::DeadLetter => "failed to process dead-letter message",
        }
    }
}

/// A Tower service that records outcome and latency of the inner handler.
#[derive(Clone)]
pub struct Measured<S> {
    inner: S,
    config: Arc<MetricsConfig>,
    kind: MetricsKind,
}

impl<S> Measured<S> {
    pub(crate) fn new(inner: S, config: Arc<MetricsConfig>, kind: MetricsKind) -> Self {
        Self {
            inner,
            config,
            kind,
        }
    }
}

impl<S> Service<Message> for Measured<S>
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
        let config = Arc::clone(&self.config);
        let kind = self.kind;

        Box::pin(async move {
            let start = Instant::now();
            let result = inner.call(msg.clone()).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            record(&config, kind, &msg, result.is_ok(), elapsed_ms);

            if let Err(err) = &result {
                config
                    .logger
                    .message_failed(kind.severity(err), &msg, err, kind.description());
            }

            result
        })
    }
}

fn record(config: &MetricsConfig, kind: MetricsKind, msg: &Message, ok: bool, elapsed_ms: f64) {
    let event_type = msg
        .metadata_value(&config.event_type_key)
        .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string());
    let status = if ok { "success" } else { "failed" };
    let count_name = format!("{}.{}", config.prefix, kind.count_metric());
    let time_name = format!("{}.{}", config.prefix, kind.time_metric());

    config.meter.scoped(|| {
        metrics::histogram!(time_name, "event_type" => event_type.clone(), "status" => status)
            .record(elapsed_ms);
        metrics::counter!(count_name, "event_type" => event_type, "status" => status)
            .increment(1);
    });
}
