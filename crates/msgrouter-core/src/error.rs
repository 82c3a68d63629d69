//! Error types shared by every middleware, and the severity classifier.
//!
//! Every layer in the processing chain returns [`HandlerError`]. Keeping one
//! error type across layers means the chain composes without conversion code,
//! and [`classify`] can decide how loudly a failure is reported.
//!
//! ```
//! use msgrouter_core::{classify, HandlerError, Severity};
//!
//! let err = HandlerError::failed("balance snapshot missing");
//! assert_eq!(classify(&err), Severity::Error);
//!
//! let err = HandlerError::warning("customer not yet synced");
//! assert_eq!(classify(&err), Severity::Warning);
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A cloneable, type-erased error.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors produced while processing a message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// The message context was cancelled (shutdown, or the caller gave up).
    #[error("context cancelled")]
    Cancelled,

    /// The processing deadline elapsed before the handler finished.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A recoverable failure the handler explicitly downgraded to a warning.
    #[error("{0}")]
    Warning(SharedError),

    /// A business-logic failure.
    #[error("{0}")]
    Failed(SharedError),

    /// The retry budget was consumed and the message could not be quarantined.
    #[error("message poisoned after {attempts} attempt(s): {source}")]
    Poisoned {
        attempts: usize,
        #[source]
        source: Box<HandlerError>,
    },

    /// The transport rejected an operation issued while handling the message.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandlerError {
    /// Wraps any error (or string) as a business failure.
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        HandlerError::Failed(Arc::from(err.into()))
    }

    /// Wraps any error (or string) as a warning-level failure.
    pub fn warning<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        HandlerError::Warning(Arc::from(err.into()))
    }

    /// Returns true for context cancellation and deadline expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            HandlerError::Cancelled
                | HandlerError::DeadlineExceeded
                | HandlerError::Transport(TransportError::Cancelled)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HandlerError::DeadlineExceeded)
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self, HandlerError::Poisoned { .. })
    }

    /// Shorthand for [`classify`].
    pub fn severity(&self) -> Severity {
        classify(self)
    }
}

/// Errors reported by the transport collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport operation cancelled")]
    Cancelled,

    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("{0}")]
    Other(SharedError),
}

impl TransportError {
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        TransportError::Other(Arc::from(err.into()))
    }
}

/// How loudly a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Expected to recover (retry, shutdown); must not page.
    Warning,
    /// Terminal, operator-visible.
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn level(&self) -> tracing::Level {
        match self {
            Severity::Warning => tracing::Level::WARN,
            Severity::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a handler failure.
///
/// Cancellation, deadline expiry and errors tagged as warnings classify as
/// [`Severity::Warning`]; everything else, including poisoned messages, as
/// [`Severity::Error`].
pub fn classify(err: &HandlerError) -> Severity {
    match err {
        HandlerError::Warning(_) => Severity::Warning,
        e if e.is_cancellation() => Severity::Warning,
        _ => Severity::Error,
    }
}
