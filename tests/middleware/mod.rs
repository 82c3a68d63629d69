//! Middleware composition tests.
//!
//! The `order_verification` module shows that layer ordering changes runtime
//! behavior. The `restore` module checks that no context state leaks out of
//! a composed chain.


use msgrouter::{handler_fn, Handler, HandlerError, Message};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handler failing its first `failures` invocations with `failure`.
pub fn failing_first(
    calls: Arc<AtomicUsize>,
    failures: usize,
    hang: bool,
) -> Handler {
    handler_fn(move |msg: Message| {
        let calls = Arc::clone(&calls);
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) >= failures {
                return Ok(());
            }
            if hang {
                Err(msg.context().done().await)
            } else {
                Err(HandlerError::failed("downstream unavailable"))
            }
        }
    })
}
