//! Failure logging through an injected logger.

use super::harness::*;
use msgrouter::{ConsumerConfig, HandlerError, Logger, Message, RetryConfiguration};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};

/// Captures level and message of every event.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(Level, String)>>>);

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for Captured {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0.lock().push((*event.metadata().level(), visitor.0));
    }
}

impl Captured {
    fn logger(&self) -> Logger {
        Logger::new(tracing::Dispatch::new(
            tracing_subscriber::registry().with(self.clone()),
        ))
    }

    fn events(&self) -> Vec<(Level, String)> {
        self.0.lock().clone()
    }
}

fn entry(level: Level, message: &str) -> (Level, String) {
    (level, message.to_string())
}

#[tokio::test(start_paused = true)]
async fn dead_lettered_message_is_logged_at_error_by_the_sink() {
    let captured = Captured::default();
    let logger = captured.logger();
    let mut harness = Harness::with_options(
        config_with_dlq(Duration::from_secs(1), RetryConfiguration::default()),
        |options| options.with_logger(logger),
    );
    harness.handle(scripted(Arc::new(AtomicUsize::new(0)), usize::MAX, Failure::Error));
    harness.start().await;

    harness.publish(Message::new("{}")).await;
    harness.wait_for_ack(msgrouter::DLQ_HANDLER_NAME).await;

    assert_eq!(
        captured.events(),
        vec![entry(Level::ERROR, "message quarantined in dead-letter topic")]
    );

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handler_failure_is_a_warning_and_nack_follows_classification() {
    let captured = Captured::default();
    let logger = captured.logger();
    let mut harness = Harness::with_options(
        ConsumerConfig::default().with_consumer_group_name("test-group"),
        |options| options.with_logger(logger),
    );
    harness.handle(scripted(Arc::new(AtomicUsize::new(0)), 1, Failure::Error));
    harness.start().await;

    harness.publish(Message::new("{}")).await;
    harness.wait_for_nack(HANDLER).await;
    harness.wait_for_ack(HANDLER).await;

    assert_eq!(
        captured.events(),
        vec![
            entry(Level::WARN, "failed to process message"),
            entry(Level::ERROR, "message returned to transport"),
        ]
    );

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn warning_failures_are_never_logged_at_error() {
    let captured = Captured::default();
    let logger = captured.logger();
    let mut harness = Harness::with_options(
        ConsumerConfig::default().with_consumer_group_name("test-group"),
        |options| options.with_logger(logger),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    harness.handle(msgrouter::handler_fn(move |_msg: Message| {
        let first = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0;
        async move {
            if first {
                Err(HandlerError::warning("upstream not ready"))
            } else {
                Ok(())
            }
        }
    }));
    harness.start().await;

    harness.publish(Message::new("{}")).await;
    harness.wait_for_ack(HANDLER).await;

    let events = captured.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|(level, _)| *level == Level::WARN));
}
