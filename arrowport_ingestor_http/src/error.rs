use arrowport_ingestor_core::{ErrorKind, IngestError, IngestionResult};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use snafu::{ErrorCompat, Snafu};
use tracing::warn;

/// Errors that can occur in the HTTP ingestor.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HttpIngestorError {
    /// The request body is not a valid ingestion request.
    #[snafu(display("invalid request body: {message}"))]
    InvalidBody { message: String },
    /// The request body is larger than the configured limit.
    #[snafu(display("request body too large: {message}"))]
    BodyTooLarge { message: String },
    /// The batch data is not valid base64.
    #[snafu(display("batch data is not valid base64"))]
    InvalidEncoding { source: base64::DecodeError },
    /// The stream name in the path can't be used with an inline configuration.
    #[snafu(display("invalid stream name: {stream}"))]
    InvalidStreamName { stream: String },
    #[snafu(transparent)]
    Ingest { source: IngestError },
}

pub type Result<T, E = HttpIngestorError> = std::result::Result<T, E>;

impl HttpIngestorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody { .. }
            | Self::InvalidEncoding { .. }
            | Self::InvalidStreamName { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Ingest { source } => match source.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Internal | ErrorKind::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// The error message followed by its causes, on one line.
    pub fn report(&self) -> String {
        ErrorCompat::iter_chain(self)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ")
    }
}

impl IntoResponse for HttpIngestorError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let message = self.report();

        if status_code.is_server_error() {
            warn!(status = %status_code, message, "ingestion request failed");
        }

        let response = Json(IngestionResult::failure(0, message));

        (status_code, response).into_response()
    }
}
