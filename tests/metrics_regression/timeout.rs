//! Processing timeout metrics.

use super::helpers::*;
use msgrouter::timeout::TimeoutLayer;
use msgrouter::{handler_fn, Message};
use serial_test::serial;
use std::time::Duration;
use tower::{Layer, ServiceExt};

#[tokio::test]
#[serial]
async fn timeout_outcomes_are_labelled() {
    init_recorder();

    let layer = TimeoutLayer::builder()
        .name("metrics-timeout")
        .processing_timeout(Duration::from_millis(20))
        .build();

    layer
        .layer(handler_fn(|_msg: Message| async { Ok(()) }))
        .oneshot(Message::new("fast"))
        .await
        .unwrap();

    let hung = layer
        .layer(handler_fn(|msg: Message| async move { Err(msg.context().done().await) }))
        .oneshot(Message::new("slow"))
        .await;
    assert!(hung.unwrap_err().is_timeout());

    let snapshot = global_snapshot();
    assert_counter_exists(&snapshot, "timeout_calls_total");
    assert_histogram_exists(&snapshot, "timeout_call_duration_seconds");
    assert_metric_has_label(&snapshot, "timeout_calls_total", "handler", "metrics-timeout");
    assert_metric_has_label(&snapshot, "timeout_calls_total", "result", "success");
    assert_metric_has_label(&snapshot, "timeout_calls_total", "result", "timeout");
}
