use std::{sync::Arc, time::Duration};

use arrow::{
    array::{Int64Array, RecordBatch},
    datatypes::{DataType, Field, Schema},
};
use arrow_flight::{FlightData, FlightDescriptor, encode::FlightDataEncoderBuilder};
use arrowport_flight::decode_put_metadata;
use arrowport_ingestor_core::{IngestionStatus, SessionOptions};
use bytes::Bytes;
use common::{descriptor, events_batch, start_server, status_code};
use futures::StreamExt;

mod common;

#[tokio::test]
async fn test_put_chunks() {
    let mut server = start_server(SessionOptions::default()).await;

    let results = server
        .put(
            "events",
            vec![events_batch(0, 100), events_batch(100, 100), events_batch(200, 50)],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = decode_put_metadata(&results[0].app_metadata).unwrap();
    assert_eq!(result.status, IngestionStatus::Success);
    assert_eq!(result.rows_processed, 250);

    assert_eq!(server.count_rows("events").await, Some(250));
}

#[tokio::test]
async fn test_put_path_descriptor() {
    let mut server = start_server(SessionOptions::default()).await;

    let input = FlightDataEncoderBuilder::new()
        .with_flight_descriptor(Some(FlightDescriptor::new_path(vec![
            "events".to_string(),
        ])))
        .build(futures::stream::iter([Ok(events_batch(0, 10))]));

    let results = server.put_stream(input).await.unwrap();
    let result = decode_put_metadata(&results[0].app_metadata).unwrap();
    assert_eq!(result.rows_processed, 10);
}

#[tokio::test]
async fn test_put_unknown_stream() {
    let mut server = start_server(SessionOptions::default()).await;

    let err = server
        .put("missing", vec![events_batch(0, 10)])
        .await
        .unwrap_err();
    assert_eq!(status_code(err), tonic::Code::NotFound);

    assert!(!server.coordinator.gateway().is_connected());
}

#[tokio::test]
async fn test_put_without_descriptor() {
    let mut server = start_server(SessionOptions::default()).await;

    let input = FlightDataEncoderBuilder::new()
        .build(futures::stream::iter([Ok(events_batch(0, 10))]));

    let err = server.put_stream(input).await.unwrap_err();
    assert_eq!(status_code(err), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_malformed_chunk_discards_session() {
    let mut server = start_server(SessionOptions::default()).await;

    let garbage = FlightData::new()
        .with_data_header(Bytes::from_static(b"not an arrow message"))
        .with_data_body(Bytes::from_static(b"garbage"));

    let input = FlightDataEncoderBuilder::new()
        .with_flight_descriptor(Some(descriptor("events")))
        .build(futures::stream::iter([
            Ok(events_batch(0, 100)),
            Ok(events_batch(100, 100)),
        ]))
        .chain(futures::stream::iter([Ok(garbage)]));

    let err = server.put_stream(input).await.unwrap_err();
    assert_eq!(status_code(err), tonic::Code::InvalidArgument);

    assert_eq!(server.count_rows("events").await, None);
}

#[tokio::test]
async fn test_idle_client_times_out() {
    let mut server = start_server(SessionOptions {
        chunk_timeout: Duration::from_millis(100),
    })
    .await;

    let input = FlightDataEncoderBuilder::new()
        .with_flight_descriptor(Some(descriptor("events")))
        .build(futures::stream::iter([Ok(events_batch(0, 10))]))
        .chain(futures::stream::pending());

    let err = server.put_stream(input).await.unwrap_err();
    assert_eq!(status_code(err), tonic::Code::DeadlineExceeded);

    assert_eq!(server.count_rows("events").await, None);
}

#[tokio::test]
async fn test_schema_only_stream() {
    let mut server = start_server(SessionOptions::default()).await;

    let input = FlightDataEncoderBuilder::new()
        .with_schema(events_batch(0, 0).schema())
        .with_flight_descriptor(Some(descriptor("events")))
        .build(futures::stream::empty());

    let results = server.put_stream(input).await.unwrap();
    let result = decode_put_metadata(&results[0].app_metadata).unwrap();
    assert_eq!(result.rows_processed, 0);

    assert_eq!(server.count_rows("events").await, None);
}

#[tokio::test]
async fn test_put_large_chunks() {
    let mut server = start_server(SessionOptions::default()).await;

    let results = server
        .put("bulk", vec![events_batch(0, 5_000), events_batch(5_000, 3_000)])
        .await
        .unwrap();

    let result = decode_put_metadata(&results[0].app_metadata).unwrap();
    assert_eq!(result.rows_processed, 8_000);
    assert_eq!(server.count_rows("bulk").await, Some(8_000));
}

#[tokio::test]
async fn test_duplicate_columns_discard_session() {
    let mut server = start_server(SessionOptions::default()).await;

    let duplicate = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("id", DataType::Int64, false),
        ])),
        vec![
            Arc::new(Int64Array::from(vec![1, 2])),
            Arc::new(Int64Array::from(vec![3, 4])),
        ],
    )
    .unwrap();

    // the second encoder announces the new schema before its batch
    let input = FlightDataEncoderBuilder::new()
        .with_flight_descriptor(Some(descriptor("events")))
        .build(futures::stream::iter([Ok(events_batch(0, 100))]))
        .chain(FlightDataEncoderBuilder::new().build(futures::stream::iter([Ok(duplicate)])));

    let err = server.put_stream(input).await.unwrap_err();
    assert_eq!(status_code(err), tonic::Code::InvalidArgument);

    assert_eq!(server.count_rows("events").await, None);
}
