//! End-to-end tests for the bridge lifecycle.
//!
//! Wires the same pieces `main` does, with the in-memory producer standing in
//! for the broker: metadata sync, the HTTP router, the delivery monitor and
//! the ordered shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use ferry_api::{create_router, AppState, Dispatcher, ServerOptions};
use ferry_core::{FerryError, JsonSerializer, LabelSpec, Producer, RawSerializer};
use ferry_producer::{DeliveryMonitor, RetryPolicy, SyncOptions, TopicMetadataSync};
use ferry_testing::{LogCapture, MockProducer};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::Level;

fn sync_options() -> SyncOptions {
    SyncOptions {
        attempt_timeout: Duration::from_millis(200),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        },
    }
}

async fn post(router: &Router, uri: &str, body: &'static str) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method("POST").uri(uri).body(Body::from(body))?;
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn bridge_lifecycle_from_sync_to_drained_monitor() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.set_default();

    let (producer, events) =
        MockProducer::builder().topic("events", 4).topic("audit-log", 1).metadata_failures(1).build();
    let monitor = DeliveryMonitor::new(events).spawn();

    let specs = LabelSpec::parse_list("orders=events:3,audit=audit-log:0")?;
    let labels = TopicMetadataSync::new(&producer, sync_options())
        .sync(&CancellationToken::new(), &specs)
        .await?;
    assert_eq!(labels.len(), 2);

    let dispatcher =
        Dispatcher::new(labels, Arc::new(producer.clone()), Arc::new(JsonSerializer), "metrics");
    let router = create_router(AppState::new(dispatcher), &ServerOptions::default());

    let (status, body) = post(&router, "/receive?label=orders", r#"{"id": 1}"#).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "status": "accepted", "topic": "events", "partition": 3 }));

    let (status, body) = post(&router, "/receive?label=audit", r#"{"id": 2}"#).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["topic"], "audit-log");

    let (status, body) = post(&router, "/receive", r#"{"id": 3}"#).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["topic"], "metrics");
    assert_eq!(body["partition"], Value::Null);

    let (status, _) = post(&router, "/receive?label=refunds", r#"{"id": 4}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(producer.produced_count(), 3);
    assert_eq!(producer.acknowledge(), 3);

    producer.close(Duration::from_secs(1)).await?;
    let summary = monitor.join(Duration::from_secs(1)).await?;

    assert_eq!(summary.delivered, 3);
    assert_eq!(summary.message_errors, 0);
    assert_eq!(summary.broker_errors, 0);
    assert!(capture.at_least(Level::ERROR).is_empty());

    Ok(())
}

#[tokio::test]
async fn failed_deliveries_are_logged_but_never_reach_the_client() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.set_default();

    let (producer, events) = MockProducer::builder().build();
    let monitor = DeliveryMonitor::new(events).spawn();

    let dispatcher = Dispatcher::new(
        ferry_core::PartitionLabelTable::empty(),
        Arc::new(producer.clone()),
        Arc::new(RawSerializer),
        "metrics",
    );
    let router = create_router(AppState::new(dispatcher), &ServerOptions::default());

    for _ in 0..2 {
        let (status, _) = post(&router, "/receive", "plain text").await?;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    assert_eq!(producer.fail_pending("MsgTimedOut", "Local: Message timed out"), 2);
    producer.broker_error("AllBrokersDown", "1/1 brokers are down");

    producer.close(Duration::from_secs(1)).await?;
    let summary = monitor.join(Duration::from_secs(1)).await?;

    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.message_errors, 2);
    assert_eq!(summary.broker_errors, 1);
    assert_eq!(capture.at_least(Level::ERROR).len(), 3);

    Ok(())
}

#[tokio::test]
async fn startup_fails_when_a_label_partition_does_not_exist() {
    let (producer, _events) = MockProducer::builder().topic("events", 2).build();

    let specs = LabelSpec::parse_list("orders=events:3").unwrap();
    let error = TopicMetadataSync::new(&producer, sync_options())
        .sync(&CancellationToken::new(), &specs)
        .await
        .unwrap_err();

    assert!(matches!(error, FerryError::PartitionOutOfRange { .. }), "unexpected error: {error}");
}

#[tokio::test]
async fn shutdown_during_sync_aborts_startup() {
    let (producer, _events) =
        MockProducer::builder().topic("events", 4).metadata_delay(Duration::from_secs(5)).build();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let specs = LabelSpec::parse_list("orders=events:3").unwrap();
    let error = TopicMetadataSync::new(&producer, sync_options()).sync(&shutdown, &specs).await.unwrap_err();

    assert!(matches!(error, FerryError::SyncCancelled));
}
