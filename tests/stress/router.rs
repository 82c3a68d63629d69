//! Router stress tests

use msgrouter::{
    handler_fn, ConsumerConfig, DlqConfig, HandlerError, InMemoryPubSub, Message, Publisher,
    RetryConfiguration, Router, RouterOptions, DLQ_HANDLER_NAME,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn config() -> ConsumerConfig {
    ConsumerConfig::default()
        .with_consumer_group_name("stress")
        .with_processing_timeout(Duration::from_secs(5))
        .with_retry(
            RetryConfiguration::default()
                .with_max_retries(2)
                .with_initial_interval(Duration::from_micros(100))
                .with_max_interval(Duration::from_micros(100)),
        )
        .with_dlq(DlqConfig::enabled("stress_dlq"))
}

/// Test: every message across many topics is acknowledged exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_many_topics_every_message_settled() {
    const TOPICS: usize = 16;
    const PER_TOPIC: usize = 10_000;

    let pubsub = Arc::new(InMemoryPubSub::new());
    let acked = Arc::new(AtomicUsize::new(0));
    let dead = Arc::new(AtomicUsize::new(0));

    let options = RouterOptions::new(pubsub.clone(), pubsub.clone(), config()).on_ack({
        let acked = Arc::clone(&acked);
        let dead = Arc::clone(&dead);
        move |handler| {
            if handler == DLQ_HANDLER_NAME {
                dead.fetch_add(1, Ordering::Relaxed);
            } else {
                acked.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
    let router = Arc::new(Router::new(options).unwrap());

    for topic in 0..TOPICS {
        router
            .add_no_publisher_handler(
                format!("handler-{topic}"),
                format!("topic-{topic}"),
                pubsub.clone(),
                handler_fn(|msg: Message| async move {
                    // Every hundredth message is poison.
                    if msg.uuid().ends_with("00") {
                        Err(HandlerError::failed("poison"))
                    } else {
                        Ok(())
                    }
                }),
            )
            .unwrap();
    }

    let run = tokio::spawn({
        let router = Arc::clone(&router);
        async move { router.run(CancellationToken::new()).await }
    });
    router.running().await;

    let start = Instant::now();
    for topic in 0..TOPICS {
        let messages = (0..PER_TOPIC)
            .map(|i| Message::with_uuid(format!("{topic}-{i:05}"), "{}"))
            .collect();
        pubsub
            .publish(&format!("topic-{topic}"), messages)
            .await
            .unwrap();
    }

    let total = TOPICS * PER_TOPIC;
    let poisoned = TOPICS * PER_TOPIC / 100;
    while acked.load(Ordering::Relaxed) < total || dead.load(Ordering::Relaxed) < poisoned {
        assert!(
            start.elapsed() < Duration::from_secs(120),
            "stalled at {} acked, {} dead-lettered",
            acked.load(Ordering::Relaxed),
            dead.load(Ordering::Relaxed)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    println!("{} messages settled in {:?}", total, start.elapsed());

    router.close().await.unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(acked.load(Ordering::Relaxed), total);
    assert_eq!(dead.load(Ordering::Relaxed), poisoned);
}

/// Test: closing while handlers are busy finishes within the close timeout
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_close_under_load() {
    let pubsub = Arc::new(InMemoryPubSub::new());
    let router = Arc::new(
        Router::new(
            RouterOptions::new(pubsub.clone(), pubsub.clone(), config())
                .with_close_timeout(Duration::from_secs(5)),
        )
        .unwrap(),
    );

    for topic in 0..8 {
        router
            .add_no_publisher_handler(
                format!("slow-{topic}"),
                format!("slow-topic-{topic}"),
                pubsub.clone(),
                handler_fn(|msg: Message| async move {
                    let ctx = msg.context();
                    ctx.until_done(tokio::time::sleep(Duration::from_millis(50)))
                        .await?;
                    Ok(())
                }),
            )
            .unwrap();
    }

    let run = tokio::spawn({
        let router = Arc::clone(&router);
        async move { router.run(CancellationToken::new()).await }
    });
    router.running().await;

    for topic in 0..8 {
        let messages = (0..1_000).map(|i| Message::new(format!("{i}"))).collect();
        pubsub
            .publish(&format!("slow-topic-{topic}"), messages)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    router.close().await.unwrap();
    run.await.unwrap().unwrap();

    println!("closed under load in {:?}", start.elapsed());
    assert!(start.elapsed() < Duration::from_secs(5));
}
