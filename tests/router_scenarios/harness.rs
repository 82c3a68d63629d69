//! Shared router test harness.

use futures::future::BoxFuture;
use msgrouter::core::FnListener;
use msgrouter::{
    handler_fn, ConsumerConfig, DlqConfig, Handler, HandlerError, InMemoryPubSub, Message,
    Publisher, RetryConfiguration, Router, RouterError, RouterEvent, RouterOptions,
    TransportError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const TOPIC: &str = "om_events";
pub const DLQ_TOPIC: &str = "om_events_dlq";
pub const HANDLER: &str = "ingest";

/// Publisher that records every publish before forwarding it.
pub struct RecordingPublisher {
    inner: Arc<InMemoryPubSub>,
    published: Mutex<Vec<(String, Message)>>,
}

impl RecordingPublisher {
    pub fn new(inner: Arc<InMemoryPubSub>) -> Self {
        Self {
            inner,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn published_to(&self, topic: &str) -> Vec<Message> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        messages: Vec<Message>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.published
                .lock()
                .extend(messages.iter().map(|msg| (topic.to_string(), msg.clone())));
            self.inner.publish(topic, messages).await
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Publisher::close(self.inner.as_ref())
    }
}

/// How a scripted handler behaves on a failing invocation.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Returns an error immediately.
    Error,
    /// Blocks until its context is done and returns the reason.
    Hang,
}

/// A handler that fails its first `failures` invocations and then succeeds.
///
/// `usize::MAX` fails forever.
pub fn scripted(calls: Arc<AtomicUsize>, failures: usize, failure: Failure) -> Handler {
    handler_fn(move |msg: Message| {
        let calls = Arc::clone(&calls);
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call >= failures {
                return Ok(());
            }
            match failure {
                Failure::Error => Err(HandlerError::failed(format!("attempt {} failed", call + 1))),
                Failure::Hang => Err(msg.context().done().await),
            }
        }
    })
}

pub fn retrying(max_retries: usize, interval: Duration) -> RetryConfiguration {
    RetryConfiguration::default()
        .with_max_retries(max_retries)
        .with_initial_interval(interval)
        .with_max_interval(interval)
}

pub fn config_with_dlq(processing_timeout: Duration, retry: RetryConfiguration) -> ConsumerConfig {
    ConsumerConfig::default()
        .with_consumer_group_name("test-group")
        .with_processing_timeout(processing_timeout)
        .with_retry(retry)
        .with_dlq(DlqConfig::enabled(DLQ_TOPIC))
}

pub struct Harness {
    pub pubsub: Arc<InMemoryPubSub>,
    pub publisher: Arc<RecordingPublisher>,
    pub router: Arc<Router>,
    events: mpsc::UnboundedReceiver<RouterEvent>,
    token: CancellationToken,
    run: Option<JoinHandle<Result<(), RouterError>>>,
}

impl Harness {
    pub fn new(config: ConsumerConfig) -> Self {
        Self::with_options(config, |options| options)
    }

    pub fn with_options(
        config: ConsumerConfig,
        customize: impl FnOnce(RouterOptions) -> RouterOptions,
    ) -> Self {
        let pubsub = Arc::new(InMemoryPubSub::new());
        let publisher = Arc::new(RecordingPublisher::new(Arc::clone(&pubsub)));
        let (tx, events) = mpsc::unbounded_channel();

        let options = RouterOptions::new(pubsub.clone(), publisher.clone(), config).listener(
            FnListener::new(move |event: &RouterEvent| {
                let _ = tx.send(event.clone());
            }),
        );
        let router = Router::new(customize(options)).expect("valid configuration");

        Self {
            pubsub,
            publisher,
            router: Arc::new(router),
            events,
            token: CancellationToken::new(),
            run: None,
        }
    }

    /// Registers `handler` as the business handler on [`TOPIC`].
    pub fn handle(&self, handler: Handler) {
        self.router
            .add_no_publisher_handler(HANDLER, TOPIC, self.pubsub.clone(), handler)
            .expect("handler registered");
    }

    pub async fn start(&mut self) {
        let router = Arc::clone(&self.router);
        let token = self.token.clone();
        self.run = Some(tokio::spawn(async move { router.run(token).await }));
        self.router.running().await;
        assert!(self.router.is_running());
    }

    pub async fn publish(&self, msg: Message) {
        Publisher::publish(self.pubsub.as_ref(), TOPIC, vec![msg])
            .await
            .expect("publish");
    }

    /// Waits for the next event matching `predicate`, discarding others.
    pub async fn wait_for(&mut self, predicate: impl Fn(&RouterEvent) -> bool) -> RouterEvent {
        let events = &mut self.events;
        tokio::time::timeout(Duration::from_secs(600), async {
            loop {
                let event = events.recv().await.expect("router event stream ended");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for router event")
    }

    pub async fn wait_for_ack(&mut self, handler: &str) -> RouterEvent {
        self.wait_for(|event| {
            matches!(event, RouterEvent::MessageAcked { handler_name, .. } if handler_name == handler)
        })
        .await
    }

    pub async fn wait_for_nack(&mut self, handler: &str) -> RouterEvent {
        self.wait_for(|event| {
            matches!(event, RouterEvent::MessageNacked { handler_name, .. } if handler_name == handler)
        })
        .await
    }

    /// Polls `condition` until it holds.
    pub async fn eventually(&self, condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(600), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    pub fn dlq_publishes(&self) -> usize {
        self.publisher.published_to(DLQ_TOPIC).len()
    }

    /// Stops `run` through its cancellation token and waits for it.
    pub async fn cancel(&mut self) -> Result<(), RouterError> {
        self.token.cancel();
        match self.run.take() {
            Some(run) => run.await.expect("run task panicked"),
            None => Ok(()),
        }
    }

    /// Closes the router and waits for `run` to return.
    ///
    /// Events emitted during shutdown stay readable through
    /// [`wait_for`](Harness::wait_for).
    pub async fn shutdown(&mut self) -> Result<(), RouterError> {
        let closed = self.router.close().await;
        if let Some(run) = self.run.take() {
            run.await.expect("run task panicked")?;
        }
        closed
    }
}
