use std::sync::Arc;

use arrowport_ingestor_core::{IngestError, IngestionCoordinator, IngestionResult, decode};
use arrowport_streams::validate_stream_name;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    error::{HttpIngestorError, InvalidEncodingSnafu, InvalidStreamNameSnafu, Result},
    types::IngestRequest,
};

/// Handler for the /stream/{stream_name} endpoint.
pub async fn ingest_handler(
    State(coordinator): State<IngestionCoordinator>,
    Path(stream_name): Path<String>,
    request: std::result::Result<Json<IngestRequest>, JsonRejection>,
) -> Response {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let message = rejection.body_text();
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                HttpIngestorError::BodyTooLarge { message }
            } else {
                HttpIngestorError::InvalidBody { message }
            };
            return err.into_response();
        }
    };

    match process_ingest_request(&coordinator, &stream_name, request).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Decode the request's batch and ingest it into the stream's destination.
///
/// An inline configuration takes precedence over the registry.
async fn process_ingest_request(
    coordinator: &IngestionCoordinator,
    stream: &str,
    request: IngestRequest,
) -> Result<IngestionResult> {
    let policy = match request.config {
        Some(config) => {
            if !validate_stream_name(stream) {
                return InvalidStreamNameSnafu { stream }.fail();
            }

            let policy = config
                .into_policy(coordinator.registry().defaults())
                .map_err(|source| IngestError::InvalidPolicy {
                    stream: stream.to_string(),
                    source,
                })?;
            Arc::new(policy)
        }
        None => coordinator.resolve(stream)?,
    };

    let data = BASE64_STANDARD
        .decode(request.batch.data.as_bytes())
        .context(InvalidEncodingSnafu)?;

    let batch = decode(&request.batch.schema, &data).map_err(|source| IngestError::Decode {
        stream: stream.to_string(),
        source,
    })?;

    debug!(
        stream,
        destination = %policy.target_table(),
        rows = batch.num_rows(),
        "received batch"
    );

    let result = coordinator
        .ingest_with_policy(stream, policy, [batch])
        .await?;

    Ok(result)
}
