//! Processing chain stress tests

use msgrouter::retry::RetryLayer;
use msgrouter::timeout::TimeoutLayer;
use msgrouter::{handler_fn, HandlerError, Message, RestoreContextLayer};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{Layer, Service, ServiceExt};

use super::InFlight;

/// Test: 1 million messages through restore, timeout and retry (no failures)
#[tokio::test]
#[ignore]
async fn stress_one_million_messages_no_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler = handler_fn(move |_msg: Message| {
        counter.fetch_add(1, Ordering::Relaxed);
        async { Ok(()) }
    });

    let timeout = TimeoutLayer::builder()
        .processing_timeout(Duration::from_secs(1))
        .build();
    let retry = RetryLayer::builder()
        .max_retries(3)
        .initial_interval(Duration::from_millis(10))
        .build();
    let mut service = RestoreContextLayer::new().layer(timeout.layer(retry.layer(handler)));

    let start = Instant::now();
    for i in 0..1_000_000u32 {
        service
            .ready()
            .await
            .unwrap()
            .call(Message::new(i.to_string()))
            .await
            .unwrap();
    }
    let elapsed = start.elapsed();

    println!("1M messages completed in {:?}", elapsed);
    println!(
        "Throughput: {:.0} messages/sec",
        1_000_000.0 / elapsed.as_secs_f64()
    );

    assert_eq!(calls.load(Ordering::Relaxed), 1_000_000);
}

/// Test: concurrent retry loops with random transient failures
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_concurrent_retries_with_random_failures() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let in_flight = InFlight::default();

    let handler = {
        let attempts = Arc::clone(&attempts);
        let in_flight = in_flight.clone();
        handler_fn(move |_msg: Message| {
            let attempts = Arc::clone(&attempts);
            let guard = in_flight.enter();
            async move {
                attempts.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
                let fail = rand::rng().random_bool(0.3);
                drop(guard);
                if fail {
                    Err(HandlerError::failed("transient"))
                } else {
                    Ok(())
                }
            }
        })
    };

    let service = RetryLayer::builder()
        .max_retries(20)
        .initial_interval(Duration::from_micros(100))
        .max_interval(Duration::from_millis(1))
        .build()
        .layer(handler);

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(1_000);
    for i in 0..1_000u32 {
        let svc = service.clone();
        tasks.push(tokio::spawn(async move {
            let mut failures = 0;
            for j in 0..100u32 {
                if svc.clone().oneshot(Message::new(format!("{i}-{j}"))).await.is_err() {
                    failures += 1;
                }
            }
            failures
        }));
    }

    let mut failures = 0;
    for task in tasks {
        failures += task.await.unwrap();
    }

    println!("100k messages with retries completed in {:?}", start.elapsed());
    println!("Total attempts: {}", attempts.load(Ordering::Relaxed));
    println!("Peak in-flight handlers: {}", in_flight.peak());

    // 0.3^21 per message: practically never exhausted.
    assert_eq!(failures, 0);
    assert!(attempts.load(Ordering::Relaxed) >= 100_000);
}
