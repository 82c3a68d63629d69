use futures::future::BoxFuture;
use futures::stream;
use msgrouter_core::{Delivery, Message, MessageStream, Publisher, Subscriber, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Non-persistent publish/subscribe over in-process channels.
///
/// Every subscription of a topic receives its own copy of each message
/// published after it subscribed. A subscription hands out one message at a
/// time: the next message is delivered only after the previous one was
/// acknowledged, and a negatively acknowledged message is delivered again.
///
/// Consumers must settle every message they take from the stream; an
/// unsettled message blocks its subscription.
#[derive(Clone, Default)]
pub struct InMemoryPubSub {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Message>>>>,
    closed: CancellationToken,
    redelivery_delay: Duration,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits `delay` before redelivering a negatively acknowledged message.
    ///
    /// Default: no delay.
    pub fn with_redelivery_delay(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                redelivery_delay: delay,
                ..Shared::default()
            }),
        }
    }

    /// Number of live subscriptions of `topic`.
    pub fn subscriptions(&self, topic: &str) -> usize {
        self.shared
            .topics
            .lock()
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|tx| !tx.is_closed()).count())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    fn shutdown(&self) {
        self.shared.closed.cancel();
        self.shared.topics.lock().clear();
    }
}

impl Subscriber for InMemoryPubSub {
    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
    ) -> BoxFuture<'a, Result<MessageStream, TransportError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            let (tx, inbox) = mpsc::unbounded_channel();
            self.shared
                .topics
                .lock()
                .entry(topic.to_string())
                .or_default()
                .push(tx);

            let subscription = Subscription {
                inbox,
                in_flight: None,
                closed: self.shared.closed.clone(),
                redelivery_delay: self.shared.redelivery_delay,
            };

            let messages: MessageStream =
                Box::pin(stream::unfold(subscription, Subscription::next_delivery));
            Ok(messages)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.shutdown();
        Box::pin(async { Ok(()) })
    }
}

impl Publisher for InMemoryPubSub {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        messages: Vec<Message>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            let mut topics = self.shared.topics.lock();
            if let Some(subscriptions) = topics.get_mut(topic) {
                subscriptions.retain(|tx| {
                    messages
                        .iter()
                        .all(|msg| tx.send(msg.copy()).is_ok())
                });
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.shutdown();
        Box::pin(async { Ok(()) })
    }
}

struct Subscription {
    inbox: mpsc::UnboundedReceiver<Message>,
    in_flight: Option<(Message, oneshot::Receiver<Delivery>)>,
    closed: CancellationToken,
    redelivery_delay: Duration,
}

impl Subscription {
    async fn next_delivery(mut self) -> Option<(Message, Self)> {
        if let Some((msg, outcome)) = self.in_flight.take() {
            let settled = tokio::select! {
                outcome = outcome => outcome,
                _ = self.closed.cancelled() => return None,
            };

            if !matches!(settled, Ok(Delivery::Ack)) {
                if !self.redelivery_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(self.redelivery_delay) => {}
                        _ = self.closed.cancelled() => return None,
                    }
                }
                return Some(self.deliver(msg));
            }
        }

        let msg = tokio::select! {
            msg = self.inbox.recv() => msg?,
            _ = self.closed.cancelled() => return None,
        };
        Some(self.deliver(msg))
    }

    fn deliver(mut self, msg: Message) -> (Message, Self) {
        let outcome = msg.track_delivery();
        self.in_flight = Some((msg.clone(), outcome));
        (msg, self)
    }
}
