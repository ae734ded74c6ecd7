//! Ingestion handler for the Arrowport Flight server.
//!
//! ## Input stream
//!
//! The first message in the input stream must contain the schema and the
//! `FlightDescriptor` of the stream being ingested. The descriptor is either
//! a command, the JSON object `{"stream_name": "..."}`, or a single-element
//! path with the stream name.
//!
//! All messages after the schema message carry one chunk each. Chunks must
//! have unique column names and no nulls in non-nullable columns. They are
//! applied to the stream's destination as they arrive, within a single
//! transaction.
//!
//! ## Response stream
//!
//! Once the client closes the input stream the transaction is committed and
//! the server sends one `PutResult`. Its `app_metadata` contains the JSON
//! encoded ingestion result, `{"status", "rows_processed", "message"}`.
//!
//! If a chunk is malformed or can't be applied, if the client stops sending
//! for too long, or if the server shuts down, the transaction is rolled back
//! and the call fails with a status code.
//!
//! ```txt
//! Client                             Server
//!   |                                  |
//!   |----- Schema + descriptor ------->|     # The server resolves the stream
//!   |----------- Chunk --------------->|     # The first chunk opens the transaction
//!   |----------- Chunk --------------->|
//!   |------------ EOS ---------------->|
//!   |                                  |     # Commit
//!   |<------------ PutResult ----------|
//!   |                                  |
//! ```
use arrow_flight::{
    FlightData,
    decode::{DecodedFlightData, DecodedPayload, FlightDataDecoder},
    error::FlightError,
};
use arrowport_ingestor_core::{
    DecodeError, DecodedBatch, IngestError, IngestionCoordinator, IngestionResult,
    SessionOptions, run_session, validate,
};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    command::StreamCommand,
    error::{
        DescriptorTimeoutSnafu, FlightServerError, MissingDescriptorSnafu, ShuttingDownSnafu,
    },
};

pub async fn process_ingestion_stream<S>(
    coordinator: &IngestionCoordinator,
    request_stream: S,
    options: SessionOptions,
    ct: CancellationToken,
) -> Result<IngestionResult, FlightServerError>
where
    S: Stream<Item = Result<FlightData, FlightError>> + Send + 'static,
{
    let mut request_stream = FlightDataDecoder::new(request_stream);

    let first = tokio::select! {
        _ = ct.cancelled() => return ShuttingDownSnafu.fail(),
        first = tokio::time::timeout(options.chunk_timeout, request_stream.next()) => first,
    };

    let first = match first {
        Err(_) => return DescriptorTimeoutSnafu.fail(),
        Ok(None) => return MissingDescriptorSnafu.fail(),
        Ok(Some(first)) => first?,
    };

    let descriptor = first
        .inner
        .flight_descriptor
        .as_ref()
        .ok_or(FlightServerError::MissingDescriptor)?;
    let stream = StreamCommand::try_from_descriptor(descriptor)?.stream_name;

    let session = coordinator.open_session(&stream)?;

    debug!(
        stream = %stream,
        destination = %session.policy().target_table(),
        "starting flight ingestion"
    );

    // The schema message may already carry a chunk.
    let first_chunk = into_chunk(&stream, Ok(first));
    let chunks = futures::stream::iter(first_chunk).chain(
        request_stream.filter_map(move |message| std::future::ready(into_chunk(&stream, message))),
    );

    let result = run_session(session, chunks, options, ct).await?;

    Ok(result)
}

fn into_chunk(
    stream: &str,
    message: Result<DecodedFlightData, FlightError>,
) -> Option<Result<DecodedBatch, IngestError>> {
    match message {
        Ok(message) => match message.payload {
            DecodedPayload::RecordBatch(batch) => {
                if let Err(source) = validate(batch.schema_ref(), &batch) {
                    return Some(Err(IngestError::Decode {
                        stream: stream.to_string(),
                        source,
                    }));
                }

                let encoded_len = message.inner.data_header.len() + message.inner.data_body.len();
                Some(Ok(DecodedBatch::new(batch, encoded_len)))
            }
            DecodedPayload::None | DecodedPayload::Schema(_) => None,
        },
        // The client went away.
        Err(FlightError::Tonic(_)) => Some(Err(IngestError::Cancelled {
            stream: stream.to_string(),
        })),
        Err(err) => Some(Err(IngestError::Decode {
            stream: stream.to_string(),
            source: DecodeError::MalformedPayload {
                message: err.to_string(),
            },
        })),
    }
}
