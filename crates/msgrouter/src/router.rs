//! The message-processing router.
//!
//! A [`Router`] binds named handlers to topics, wraps each of them in the
//! processing chain, and consumes until it is cancelled or closed:
//!
//! ```text
//! restore_context -> handler_metrics -> timeout -> retry (+ dead letter) -> handler
//! ```
//!
//! The processing deadline covers the whole message, retries and backoff
//! included. Once it has passed, each remaining attempt fails and counts
//! against the retry budget like any other failure, so a hanging message is
//! quarantined within roughly one processing timeout.
//!
//! When the dead-letter queue is enabled the router also consumes the
//! dead-letter topic with a terminal sink handler (`dlq_telemetry`) wrapped
//! only in context restoration and dead-letter metrics.

use crate::config::{ConfigError, ConsumerConfig};
use crate::dlq::{dead_letter_sink, DLQ_HANDLER_NAME};
use crate::events::RouterEvent;
use crate::restore::RestoreContextLayer;
use futures::StreamExt;
use msgrouter_core::{
    boxed, classify, EventListener, EventListeners, FnListener, Handler, HandlerError,
    HandlerInfo, Logger, Message, MessageContext, MessageStream, MetricMeter, Middleware,
    MiddlewareChain, Publisher, Severity, Subscriber, TransportError, CONSUMER_GROUP_KEY,
    HANDLER_NAME_KEY, TOPIC_KEY,
};
use msgrouter_metrics::{DlqMetricsLayer, HandlerMetricsLayer};
use msgrouter_timeout::TimeoutLayer;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, info, warn};

/// Errors reported by the router surface.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid consumer configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("handler {0:?} is already registered")]
    DuplicateHandler(String),

    #[error("router is already running")]
    AlreadyRunning,

    #[error("router is closed")]
    Closed,

    #[error("handlers did not stop within {0:?}")]
    CloseTimeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Collaborators and configuration of a [`Router`].
pub struct RouterOptions {
    subscriber: Arc<dyn Subscriber>,
    publisher: Arc<dyn Publisher>,
    logger: Logger,
    meter: MetricMeter,
    config: ConsumerConfig,
    dlq_metric_prefix: String,
    close_timeout: Duration,
    event_listeners: EventListeners<RouterEvent>,
}

impl RouterOptions {
    /// Creates options with the global logger and meter.
    ///
    /// `subscriber` consumes the dead-letter topic; `publisher` writes to it.
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        publisher: Arc<dyn Publisher>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            subscriber,
            publisher,
            logger: Logger::global(),
            meter: MetricMeter::global(),
            config,
            dlq_metric_prefix: "dlq".to_string(),
            close_timeout: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_meter(mut self, meter: MetricMeter) -> Self {
        self.meter = meter;
        self
    }

    /// Metric prefix of the dead-letter sink. Default: `"dlq"`
    pub fn with_dlq_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dlq_metric_prefix = prefix.into();
        self
    }

    /// Upper bound on waiting for in-flight messages in [`Router::close`].
    ///
    /// Default: 30 seconds
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Registers a listener for every router event.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RouterEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback invoked with the handler name after each acknowledged message.
    pub fn on_ack<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RouterEvent::MessageAcked { handler_name, .. } = event {
                f(handler_name);
            }
        }));
        self
    }

    /// Registers a callback invoked with the handler name and failure
    /// severity after each negatively acknowledged message.
    pub fn on_nack<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Severity) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RouterEvent::MessageNacked {
                handler_name,
                severity,
                ..
            } = event
            {
                f(handler_name, *severity);
            }
        }));
        self
    }
}

impl fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("config", &self.config)
            .field("dlq_metric_prefix", &self.dlq_metric_prefix)
            .field("close_timeout", &self.close_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Route {
    Business,
    DeadLetter,
}

struct Registration {
    info: HandlerInfo,
    subscriber: Arc<dyn Subscriber>,
    handler: Handler,
    route: Route,
}

#[derive(Default)]
struct Registry {
    handlers: Vec<Registration>,
    middlewares: Vec<Middleware>,
    /// Distinct subscribers in acquisition order.
    subscribers: Vec<Arc<dyn Subscriber>>,
    started: bool,
    closed: bool,
}

/// Runs registered handlers against their topics.
///
/// A router is built once, gets its handlers registered, runs until it is
/// cancelled or closed, and is closed once. [`run`](Router::run) and
/// [`close`](Router::close) take `&self` so a shared router can be stopped
/// from another task.
pub struct Router {
    subscriber: Arc<dyn Subscriber>,
    publisher: Arc<dyn Publisher>,
    logger: Logger,
    meter: MetricMeter,
    config: ConsumerConfig,
    dlq_metric_prefix: String,
    close_timeout: Duration,
    event_listeners: Arc<EventListeners<RouterEvent>>,
    registry: Mutex<Registry>,
    root: CancellationToken,
    tasks: TaskTracker,
    phase: watch::Sender<Phase>,
}

impl Router {
    /// Validates the configuration and builds a router.
    ///
    /// With the dead-letter queue enabled, the dead-letter sink is registered
    /// on the configured topic.
    pub fn new(options: RouterOptions) -> Result<Self, RouterError> {
        options.config.validate()?;

        let (phase, _) = watch::channel(Phase::Idle);
        let subscriber = options.subscriber;
        let router = Self {
            subscriber: Arc::clone(&subscriber),
            publisher: options.publisher,
            logger: options.logger,
            meter: options.meter,
            config: options.config,
            dlq_metric_prefix: options.dlq_metric_prefix,
            close_timeout: options.close_timeout,
            event_listeners: Arc::new(options.event_listeners),
            registry: Mutex::new(Registry {
                subscribers: vec![subscriber],
                ..Registry::default()
            }),
            root: CancellationToken::new(),
            tasks: TaskTracker::new(),
            phase,
        };

        if router.config.dlq.enabled {
            router.register(Registration {
                info: HandlerInfo::new(DLQ_HANDLER_NAME, router.config.dlq.topic.clone()),
                subscriber: Arc::clone(&router.subscriber),
                handler: dead_letter_sink(router.logger.clone()),
                route: Route::DeadLetter,
            })?;
        }

        Ok(router)
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Registers a handler that consumes `topic` and publishes nothing.
    ///
    /// Handlers must be registered before [`run`](Router::run).
    pub fn add_no_publisher_handler(
        &self,
        name: impl Into<String>,
        topic: impl Into<String>,
        subscriber: Arc<dyn Subscriber>,
        handler: Handler,
    ) -> Result<(), RouterError> {
        self.register(Registration {
            info: HandlerInfo::new(name, topic),
            subscriber,
            handler,
            route: Route::Business,
        })
    }

    fn register(&self, registration: Registration) -> Result<(), RouterError> {
        let mut registry = self.registry.lock();
        registry.ensure_open()?;

        if registry
            .handlers
            .iter()
            .any(|existing| existing.info.name() == registration.info.name())
        {
            return Err(RouterError::DuplicateHandler(
                registration.info.name().to_string(),
            ));
        }

        if !registry
            .subscribers
            .iter()
            .any(|known| same_object(known, &registration.subscriber))
        {
            registry.subscribers.push(Arc::clone(&registration.subscriber));
        }

        registry.handlers.push(registration);
        Ok(())
    }

    /// Appends a middleware to every business handler, innermost, after the
    /// built-in chain.
    pub fn add_middleware(&self, middleware: Middleware) -> Result<(), RouterError> {
        let mut registry = self.registry.lock();
        registry.ensure_open()?;
        registry.middlewares.push(middleware);
        Ok(())
    }

    /// Names of the middlewares applied to business handlers, outermost first.
    pub fn middlewares(&self) -> Vec<&'static str> {
        let custom = self.registry.lock().middlewares.clone();
        self.business_chain(custom).names()
    }

    fn business_chain(&self, custom: Vec<Middleware>) -> MiddlewareChain {
        let meter = self.meter.clone();
        let logger = self.logger.clone();
        let retry = self.config.retry.clone();
        let dead_letter = self
            .config
            .dlq
            .enabled
            .then(|| (Arc::clone(&self.publisher), self.config.dlq.topic.clone()));
        let processing_timeout = self.config.processing_timeout;

        let mut chain = MiddlewareChain::new()
            .with(Middleware::layer("restore_context", RestoreContextLayer::new()))
            .with(Middleware::new("handler_metrics", move |handler, info| {
                boxed(HandlerMetricsLayer::new(meter.clone(), info.name(), logger.clone()).layer(handler))
            }))
            .with(Middleware::new("timeout", move |handler, info| {
                let layer = TimeoutLayer::builder()
                    .processing_timeout(processing_timeout)
                    .name(info.name())
                    .build();
                boxed(layer.layer(handler))
            }))
            .with(Middleware::new("retry", move |handler, info| {
                let mut builder = retry.layer_builder().name(info.name());
                if let Some((publisher, topic)) = &dead_letter {
                    builder = builder.dead_letter(Arc::clone(publisher), topic.clone());
                }
                boxed(builder.build().layer(handler))
            }));

        for middleware in custom {
            chain.push(middleware);
        }
        chain
    }

    fn dead_letter_chain(&self) -> MiddlewareChain {
        let meter = self.meter.clone();
        let logger = self.logger.clone();
        let prefix = self.dlq_metric_prefix.clone();

        MiddlewareChain::new()
            .with(Middleware::layer("restore_context", RestoreContextLayer::new()))
            .with(Middleware::new("dlq_metrics", move |handler, _info| {
                boxed(DlqMetricsLayer::new(meter.clone(), prefix.clone(), logger.clone()).layer(handler))
            }))
    }

    /// Subscribes every handler and processes messages until `token` is
    /// cancelled or the router is closed.
    ///
    /// Returns the transport error verbatim if a subscription fails; handlers
    /// that already started are stopped first.
    pub async fn run(&self, token: CancellationToken) -> Result<(), RouterError> {
        let (registrations, custom) = {
            let mut registry = self.registry.lock();
            registry.ensure_open()?;
            registry.started = true;
            (
                std::mem::take(&mut registry.handlers),
                registry.middlewares.clone(),
            )
        };

        let business = self.business_chain(custom);
        let dead_letter = self.dead_letter_chain();

        for registration in registrations {
            let chain = match registration.route {
                Route::Business => &business,
                Route::DeadLetter => &dead_letter,
            };

            let messages = match registration
                .subscriber
                .subscribe(registration.info.topic())
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(
                        handler = %registration.info.name(),
                        topic = %registration.info.topic(),
                        error = %err,
                        "subscription failed, stopping router"
                    );
                    self.stop().await;
                    return Err(err.into());
                }
            };

            let consumer = Consumer {
                handler: chain.apply(registration.handler, &registration.info),
                info: registration.info,
                consumer_group: self.config.consumer_group_name.clone(),
                logger: self.logger.clone(),
                listeners: Arc::clone(&self.event_listeners),
                token: self.root.child_token(),
            };

            self.tasks.spawn(consumer.consume(messages));
        }

        // A concurrent close may already have stopped the router.
        self.phase.send_if_modified(|phase| {
            let idle = *phase == Phase::Idle;
            if idle {
                *phase = Phase::Running;
            }
            idle
        });
        info!(consumer_group = %self.config.consumer_group_name, "router running");

        tokio::select! {
            _ = token.cancelled() => {}
            _ = self.root.cancelled() => {}
        }

        self.stop().await;
        Ok(())
    }

    async fn stop(&self) {
        self.root.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.phase.send_replace(Phase::Stopped);
    }

    /// Resolves once [`run`](Router::run) has subscribed every handler, or
    /// the router stopped without getting there.
    pub async fn running(&self) {
        let mut phase = self.phase.subscribe();
        let _ = phase.wait_for(|phase| *phase != Phase::Idle).await;
    }

    pub fn is_running(&self) -> bool {
        *self.phase.borrow() == Phase::Running
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Stops all handlers and releases the transport.
    ///
    /// In-flight messages get up to the configured close timeout to finish
    /// (their contexts are cancelled, so well-behaved handlers return
    /// promptly). Subscribers and then the publisher are closed in reverse
    /// order of acquisition; every resource is closed even if an earlier one
    /// fails, and the first error is returned. Closing an already closed
    /// router does nothing.
    pub async fn close(&self) -> Result<(), RouterError> {
        let (subscribers, started) = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return Ok(());
            }
            registry.closed = true;
            (registry.subscribers.clone(), registry.started)
        };

        info!("closing router");
        self.root.cancel();
        self.tasks.close();

        // A run still subscribing spawns its remaining consumers before it
        // leaves the idle phase; the drain has to wait for those too.
        let drained = async {
            if started {
                let mut phase = self.phase.subscribe();
                let _ = phase.wait_for(|phase| *phase != Phase::Idle).await;
            }
            self.tasks.wait().await;
        };

        let mut first_error = None;
        if tokio::time::timeout(self.close_timeout, drained)
            .await
            .is_err()
        {
            warn!(timeout = ?self.close_timeout, "handlers did not stop in time");
            first_error = Some(RouterError::CloseTimeout(self.close_timeout));
        }

        for subscriber in subscribers.iter().rev() {
            if let Err(err) = subscriber.close().await {
                warn!(error = %err, "failed to close subscriber");
                first_error.get_or_insert(RouterError::Transport(err));
            }
        }

        if let Err(err) = self.publisher.close().await {
            warn!(error = %err, "failed to close publisher");
            first_error.get_or_insert(RouterError::Transport(err));
        }

        self.phase.send_replace(Phase::Stopped);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl Registry {
    fn ensure_open(&self) -> Result<(), RouterError> {
        if self.closed {
            return Err(RouterError::Closed);
        }
        if self.started {
            return Err(RouterError::AlreadyRunning);
        }
        Ok(())
    }
}

fn same_object(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Consumes one subscription with one composed handler.
struct Consumer {
    handler: Handler,
    info: HandlerInfo,
    consumer_group: String,
    logger: Logger,
    listeners: Arc<EventListeners<RouterEvent>>,
    token: CancellationToken,
}

impl Consumer {
    async fn consume(mut self, mut messages: MessageStream) {
        debug!(handler = %self.info.name(), topic = %self.info.topic(), "handler started");
        self.listeners.emit(&RouterEvent::HandlerStarted {
            handler_name: self.info.name().to_string(),
            timestamp: Instant::now(),
            topic: self.info.topic().to_string(),
        });

        loop {
            let msg = tokio::select! {
                _ = self.token.cancelled() => break,
                next = messages.next() => match next {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.process(msg).await;
        }

        debug!(handler = %self.info.name(), "handler stopped");
        self.listeners.emit(&RouterEvent::HandlerStopped {
            handler_name: self.info.name().to_string(),
            timestamp: Instant::now(),
        });
    }

    async fn process(&mut self, msg: Message) {
        msg.set_context(
            MessageContext::with_cancellation(self.token.child_token())
                .with_attribute(HANDLER_NAME_KEY, self.info.name())
                .with_attribute(TOPIC_KEY, self.info.topic())
                .with_attribute(CONSUMER_GROUP_KEY, self.consumer_group.as_str()),
        );

        let result = match self.handler.ready().await {
            Ok(handler) => handler.call(msg.clone()).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                msg.ack();
                self.listeners.emit(&RouterEvent::MessageAcked {
                    handler_name: self.info.name().to_string(),
                    timestamp: Instant::now(),
                    message_uuid: msg.uuid().to_string(),
                });
            }
            Err(err) => self.reject(&msg, &err),
        }
    }

    fn reject(&self, msg: &Message, err: &HandlerError) {
        let severity = classify(err);
        self.logger
            .message_failed(severity, msg, err, "message returned to transport");
        msg.nack();

        self.listeners.emit(&RouterEvent::MessageNacked {
            handler_name: self.info.name().to_string(),
            timestamp: Instant::now(),
            message_uuid: msg.uuid().to_string(),
            severity,
            error: err.to_string(),
        });
    }
}
