//! Terminal sink for the dead-letter topic.

use msgrouter_core::{handler_fn, Handler, Logger, Message, Metadata};
use msgrouter_retry::{POISONED_ATTEMPTS_KEY, POISONED_HANDLER_KEY, REASON_POISONED_KEY};

/// Name under which the router registers the dead-letter sink.
pub const DLQ_HANDLER_NAME: &str = "dlq_telemetry";

/// Builds the dead-letter sink handler.
///
/// The sink logs every quarantined message at `error` and always succeeds:
/// a dead-lettered message is never retried or requeued.
pub fn dead_letter_sink(logger: Logger) -> Handler {
    handler_fn(move |msg: Message| {
        let logger = logger.clone();
        async move {
            report(&logger, &msg);
            Ok(())
        }
    })
}

fn report(logger: &Logger, msg: &Message) {
    let metadata = msg.metadata();
    let payload = String::from_utf8_lossy(msg.payload());

    logger.in_scope(|| {
        tracing::error!(
            message_uuid = %msg.uuid(),
            metadata = ?metadata,
            payload = %payload,
            reason = field(&metadata, REASON_POISONED_KEY),
            handler = field(&metadata, POISONED_HANDLER_KEY),
            attempts = field(&metadata, POISONED_ATTEMPTS_KEY),
            "message quarantined in dead-letter topic"
        )
    });
}

fn field<'a>(metadata: &'a Metadata, key: &str) -> &'a str {
    metadata.get(key).map(String::as_str).unwrap_or("")
}
