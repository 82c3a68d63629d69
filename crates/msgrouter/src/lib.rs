//! At-least-once message-processing router.
//!
//! `msgrouter` consumes topics through a pluggable transport and runs every
//! message through a fixed processing chain before handing it to a business
//! handler:
//!
//! - **Context restoration**: the message context is put back after every
//!   invocation, so redeliveries never see leftovers.
//! - **Handler metrics**: outcome counts and latency per event type; failures
//!   are logged at `warn`.
//! - **Timeout**: a per-message processing deadline carried by the message
//!   context and shared by every attempt.
//! - **Retry**: exponential backoff bounded by a retry count and an optional
//!   elapsed-time budget. Messages that exhaust the budget are published to a
//!   dead-letter topic when one is configured.
//!
//! Messages landing on the dead-letter topic are consumed by a terminal sink
//! that logs them at `error` and records dead-letter metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use msgrouter::{
//!     handler_fn, ConsumerConfig, DlqConfig, InMemoryPubSub, Message, RetryConfiguration,
//!     Router, RouterOptions,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pubsub = Arc::new(InMemoryPubSub::new());
//!
//! let config = ConsumerConfig::default()
//!     .with_consumer_group_name("balance-worker")
//!     .with_processing_timeout(Duration::from_secs(10))
//!     .with_retry(
//!         RetryConfiguration::default()
//!             .with_max_retries(5)
//!             .with_initial_interval(Duration::from_millis(100))
//!             .with_max_interval(Duration::from_secs(1)),
//!     )
//!     .with_dlq(DlqConfig::enabled("om_sys.balance_worker_dlq"));
//!
//! let router = Arc::new(Router::new(RouterOptions::new(
//!     pubsub.clone(),
//!     pubsub.clone(),
//!     config,
//! ))?);
//!
//! router.add_no_publisher_handler(
//!     "balance_worker",
//!     "om_events",
//!     pubsub.clone(),
//!     handler_fn(|msg: Message| async move {
//!         println!("processing {}", msg.uuid());
//!         Ok(())
//!     }),
//! )?;
//!
//! let token = CancellationToken::new();
//! let running = tokio::spawn({
//!     let router = Arc::clone(&router);
//!     let token = token.clone();
//!     async move { router.run(token).await }
//! });
//!
//! router.running().await;
//! // ... on shutdown:
//! router.close().await?;
//! running.await??;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dlq;
pub mod events;
pub mod restore;
pub mod router;
pub mod transport;

pub use config::{ConfigError, ConsumerConfig, DlqConfig, RetryConfiguration};
pub use dlq::{dead_letter_sink, DLQ_HANDLER_NAME};
pub use events::RouterEvent;
pub use restore::{RestoreContext, RestoreContextLayer};
pub use router::{Router, RouterError, RouterOptions};
pub use transport::InMemoryPubSub;

// Re-export the building blocks
pub use msgrouter_core as core;
pub use msgrouter_metrics as metrics;
pub use msgrouter_retry as retry;
pub use msgrouter_timeout as timeout;

pub use msgrouter_core::{
    classify, handler_fn, Handler, HandlerError, Logger, Message, MessageContext, MetricMeter,
    Middleware, Publisher, Severity, Subscriber, TransportError,
};
