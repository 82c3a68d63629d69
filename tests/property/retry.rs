//! Property tests for the retry controller.
//!
//! Invariants tested:
//! - A handler is invoked at most `max_retries + 1` times
//! - The first success ends the loop
//! - Exactly one dead-letter publish happens iff the budget is exhausted
//! - Without a dead-letter topic an exhausted message surfaces as poisoned
//! - Under one processing deadline, hanging attempts count exactly like errors

use super::CollectingPublisher;
use msgrouter::retry::RetryLayer;
use msgrouter::timeout::TimeoutLayer;
use msgrouter::{handler_fn, HandlerError, Message};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tower::{Layer, ServiceExt};

fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn failing_first(calls: Arc<AtomicUsize>, failures: usize) -> msgrouter::Handler {
    handler_fn(move |_msg: Message| {
        let calls = Arc::clone(&calls);
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                Err(HandlerError::failed("flaky dependency"))
            } else {
                Ok(())
            }
        }
    })
}

/// Fails the invocations listed in `script` (`true` hangs until the context
/// is done, `false` errors at once) and succeeds afterwards.
fn scripted_failures(calls: Arc<AtomicUsize>, script: Vec<bool>) -> msgrouter::Handler {
    handler_fn(move |msg: Message| {
        let calls = Arc::clone(&calls);
        let script = script.clone();
        async move {
            match script.get(calls.fetch_add(1, Ordering::SeqCst)) {
                Some(true) => Err(msg.context().done().await),
                Some(false) => Err(HandlerError::failed("flaky dependency")),
                None => Ok(()),
            }
        }
    })
}

/// Runs `script` through `timeout -> retry -> handler` and returns the
/// invocation and dead-letter counts.
fn run_under_deadline(max_retries: usize, script: Vec<bool>) -> (usize, usize) {
    paused_runtime().block_on(async {
        let calls = Arc::new(AtomicUsize::new(0));
        let publisher = Arc::new(CollectingPublisher::default());

        let retry = RetryLayer::builder()
            .max_retries(max_retries)
            .initial_interval(Duration::from_millis(5))
            .max_interval(Duration::from_millis(5))
            .dead_letter(publisher.clone(), "dlq")
            .build();
        let timeout = TimeoutLayer::builder()
            .processing_timeout(Duration::from_millis(100))
            .build();

        let result = timeout
            .layer(retry.layer(scripted_failures(Arc::clone(&calls), script)))
            .oneshot(Message::new("payload"))
            .await;
        assert!(result.is_ok(), "{result:?}");

        let dead_letters = publisher.published.lock().len();
        (calls.load(Ordering::SeqCst), dead_letters)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: invocations are bounded and dead-lettering happens exactly
    /// when the handler never succeeds within the budget.
    #[test]
    fn invocations_and_dead_letters_match_budget(
        max_retries in 0usize..=6,
        failures in 0usize..=9,
    ) {
        let rt = paused_runtime();
        let (calls, dead_letters, result) = rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let publisher = Arc::new(CollectingPublisher::default());

            let layer = RetryLayer::builder()
                .max_retries(max_retries)
                .initial_interval(Duration::from_millis(5))
                .max_interval(Duration::from_millis(40))
                .dead_letter(publisher.clone(), "dlq")
                .build();

            let result = layer
                .layer(failing_first(Arc::clone(&calls), failures))
                .oneshot(Message::new("payload"))
                .await;

            let dead_letters = publisher.published.lock().len();
            (calls.load(Ordering::SeqCst), dead_letters, result)
        });

        prop_assert!(result.is_ok());
        prop_assert_eq!(calls, failures.min(max_retries) + 1);
        prop_assert_eq!(dead_letters, usize::from(failures > max_retries));
    }

    /// Property: without a dead-letter topic the last error is surfaced,
    /// wrapped as poisoned once at least one retry happened.
    #[test]
    fn exhaustion_without_dead_letter_reports_error(
        max_retries in 0usize..=6,
    ) {
        let rt = paused_runtime();
        let (calls, result) = rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let layer = RetryLayer::builder()
                .max_retries(max_retries)
                .initial_interval(Duration::from_millis(5))
                .max_interval(Duration::from_millis(5))
                .build();

            let result = layer
                .layer(failing_first(Arc::clone(&calls), usize::MAX))
                .oneshot(Message::new("payload"))
                .await;
            (calls.load(Ordering::SeqCst), result)
        });

        prop_assert_eq!(calls, max_retries + 1);
        match result {
            Err(HandlerError::Poisoned { attempts, .. }) => {
                prop_assert!(max_retries > 0);
                prop_assert_eq!(attempts, max_retries + 1);
            }
            Err(HandlerError::Failed(_)) => prop_assert_eq!(max_retries, 0),
            other => prop_assert!(false, "unexpected result {:?}", other),
        }
    }

    /// Property: an elapsed-time budget never lets a retry start past it.
    #[test]
    fn elapsed_budget_bounds_retry_start(
        interval_ms in 1u64..=50,
        budget_ms in 1u64..=400,
    ) {
        let rt = paused_runtime();
        let (calls, elapsed) = rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let layer = RetryLayer::builder()
                .max_retries(1_000)
                .initial_interval(Duration::from_millis(interval_ms))
                .max_interval(Duration::from_millis(interval_ms))
                .max_elapsed_time(Some(Duration::from_millis(budget_ms)))
                .build();

            let start = tokio::time::Instant::now();
            let _ = layer
                .layer(failing_first(Arc::clone(&calls), usize::MAX))
                .oneshot(Message::new("payload"))
                .await;
            (calls.load(Ordering::SeqCst), start.elapsed())
        });

        prop_assert!(elapsed <= Duration::from_millis(budget_ms));
        prop_assert_eq!(calls as u64, budget_ms / interval_ms + 1);
    }

    /// Property: a hang costs one attempt of the budget, exactly like an
    /// error, wherever it appears in the failure sequence.
    #[test]
    fn hangs_and_errors_share_the_retry_budget(
        max_retries in 0usize..=5,
        script in prop::collection::vec(any::<bool>(), 0..=8),
    ) {
        let failures = script.len();
        let errors_only = vec![false; failures];

        let (calls, dead_letters) = run_under_deadline(max_retries, script);
        let (error_calls, error_dead_letters) = run_under_deadline(max_retries, errors_only);

        prop_assert_eq!(calls, failures.min(max_retries) + 1);
        prop_assert_eq!(calls, error_calls);
        prop_assert_eq!(dead_letters, usize::from(failures > max_retries));
        prop_assert_eq!(dead_letters, error_dead_letters);
    }
}
