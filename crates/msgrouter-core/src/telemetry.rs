//! Injected telemetry handles.
//!
//! [`MetricMeter`] and [`Logger`] let a router (or a test) point metrics and
//! logs at a specific backend without touching process-global state. Both
//! fall back to the global `metrics` recorder and `tracing` dispatcher when
//! nothing is injected.

use crate::error::{HandlerError, Severity};
use crate::message::Message;
use metrics::Recorder;
use std::fmt;
use std::sync::Arc;
use tracing::Dispatch;

/// Handle to a metrics backend.
#[derive(Clone, Default)]
pub struct MetricMeter {
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl MetricMeter {
    /// Uses whatever recorder is installed globally.
    pub fn global() -> Self {
        Self { recorder: None }
    }

    pub fn new<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        Self {
            recorder: Some(Arc::new(recorder)),
        }
    }

    pub fn from_arc(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Self {
            recorder: Some(recorder),
        }
    }

    /// Runs `f` with this meter's recorder active for the `metrics` macros.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.recorder {
            Some(recorder) => metrics::with_local_recorder(recorder.as_ref(), f),
            None => f(),
        }
    }
}

impl fmt::Debug for MetricMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricMeter")
            .field("injected", &self.recorder.is_some())
            .finish()
    }
}

/// Handle to a structured logging backend.
#[derive(Clone, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Uses the default `tracing` dispatcher of the calling thread.
    pub fn global() -> Self {
        Self { dispatch: None }
    }

    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Runs `f` with this logger's dispatcher as the default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Logs a failed message at `severity`, attaching metadata and payload.
    pub fn message_failed(
        &self,
        severity: Severity,
        msg: &Message,
        err: &HandlerError,
        description: &str,
    ) {
        let metadata = msg.metadata();
        let payload = String::from_utf8_lossy(msg.payload());

        self.in_scope(|| match severity {
            Severity::Warning => tracing::warn!(
                message_uuid = %msg.uuid(),
                metadata = ?metadata,
                payload = %payload,
                error = %err,
                "{description}"
            ),
            Severity::Error => tracing::error!(
                message_uuid = %msg.uuid(),
                metadata = ?metadata,
                payload = %payload,
                error = %err,
                "{description}"
            ),
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("injected", &self.dispatch.is_some())
            .finish()
    }
}
