use std::sync::Arc;

use arrowport_ingestor_core::{ErrorKind, IngestError, IngestionStatus};
use arrowport_store::StoreError;
use arrowport_streams::{DEFAULT_CHUNK_SIZE, PolicyDefaults, StreamConfig};
use common::{create_harness, decoded_events, incompatible_batch};

mod common;

#[tokio::test]
async fn test_events_are_appended() {
    let harness = create_harness(1_000);

    let result = harness
        .coordinator
        .ingest("events", vec![decoded_events(0, 5)])
        .await
        .expect("first ingestion");
    assert_eq!(result.status, IngestionStatus::Success);
    assert_eq!(result.rows_processed, 5);

    let result = harness
        .coordinator
        .ingest("events", vec![decoded_events(5, 3)])
        .await
        .expect("second ingestion");
    assert_eq!(result.rows_processed, 3);

    assert_eq!(harness.count_rows("events").await, Some(8));
    assert_eq!(harness.factory.begins(), 2);
}

#[tokio::test]
async fn test_unknown_stream_opens_no_transaction() {
    let harness = create_harness(1_000);

    let err = harness
        .coordinator
        .ingest("unknown", vec![decoded_events(0, 5)])
        .await
        .unwrap_err();

    assert!(err.is_unknown_stream());
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(harness.factory.begins(), 0);
    assert!(!harness.coordinator.gateway().is_connected());
    assert!(harness.metrics.records().is_empty());
}

#[tokio::test]
async fn test_failing_batch_retains_nothing() {
    let harness = create_harness(1_000);

    let err = harness
        .coordinator
        .ingest(
            "events",
            vec![
                decoded_events(0, 10),
                decoded_events(10, 10),
                incompatible_batch(),
            ],
        )
        .await
        .unwrap_err();

    match &err {
        IngestError::ProcessingFailed {
            stream,
            destination,
            rows_applied,
            source,
        } => {
            assert_eq!(stream, "events");
            assert_eq!(destination, "events");
            assert_eq!(*rows_applied, 20);
            assert!(matches!(source, StoreError::Statement { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Internal);

    assert_eq!(harness.count_rows("events").await, None);
    assert!(harness.metrics.records().is_empty());
}

#[tokio::test]
async fn test_failure_keeps_previous_rows() {
    let harness = create_harness(1_000);

    harness
        .coordinator
        .ingest("events", vec![decoded_events(0, 5)])
        .await
        .expect("first ingestion");

    harness
        .coordinator
        .ingest("events", vec![decoded_events(5, 5), incompatible_batch()])
        .await
        .unwrap_err();

    assert_eq!(harness.count_rows("events").await, Some(5));
}

#[tokio::test]
async fn test_batches_are_split_in_chunks() {
    let harness = create_harness(7);

    let result = harness
        .coordinator
        .ingest("events", vec![decoded_events(0, 20), decoded_events(20, 3)])
        .await
        .expect("ingestion");

    assert_eq!(result.rows_processed, 23);
    assert_eq!(harness.count_rows("events").await, Some(23));
}

#[tokio::test]
async fn test_metrics_recorded_after_commit() {
    let harness = create_harness(1_000);
    let batch = decoded_events(0, 4);
    let encoded_len = batch.encoded_len() as u64;

    harness
        .coordinator
        .ingest("zstd_events", vec![batch])
        .await
        .expect("ingestion");

    let records = harness.metrics.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stream, "zstd_events");
    assert_eq!(records[0].destination, "analytics.events");
    assert_eq!(records[0].compression, "zstd");
    assert_eq!(records[0].rows, 4);
    assert_eq!(records[0].bytes, encoded_len);

    assert_eq!(harness.count_rows("analytics.events").await, Some(4));
}

#[tokio::test]
async fn test_ingest_with_explicit_policy() {
    let harness = create_harness(1_000);
    let policy = StreamConfig::new("inline_events")
        .with_chunk_size(2)
        .into_policy(&PolicyDefaults::default())
        .expect("policy");

    let result = harness
        .coordinator
        .ingest_with_policy("not_registered", Arc::new(policy), vec![decoded_events(0, 5)])
        .await
        .expect("ingestion");

    assert_eq!(result.rows_processed, 5);
    assert_eq!(harness.count_rows("inline_events").await, Some(5));
}

#[tokio::test]
async fn test_large_batches_with_default_policy() {
    let harness = create_harness(DEFAULT_CHUNK_SIZE);

    let result = harness
        .coordinator
        .ingest("events", vec![decoded_events(0, 5_000)])
        .await
        .expect("ingestion");
    assert_eq!(result.rows_processed, 5_000);

    let policy = StreamConfig::new("events")
        .with_chunk_size(3_000)
        .into_policy(&PolicyDefaults::default())
        .expect("policy");
    let result = harness
        .coordinator
        .ingest_with_policy("events", Arc::new(policy), vec![decoded_events(5_000, 7_500)])
        .await
        .expect("ingestion");
    assert_eq!(result.rows_processed, 7_500);

    assert_eq!(harness.count_rows("events").await, Some(12_500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingestions_are_serialized() {
    let harness = Arc::new(create_harness(1_000));

    let tasks = (0..8)
        .map(|i| {
            let harness = harness.clone();
            tokio::spawn(async move {
                harness
                    .coordinator
                    .ingest("events", vec![decoded_events(i * 10, 10)])
                    .await
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.expect("ingestion task").expect("ingestion");
    }

    assert_eq!(harness.count_rows("events").await, Some(80));
    assert_eq!(harness.metrics.records().len(), 8);
}
