use arrowport_ingestor_core::{ErrorKind, IngestError};
use snafu::Snafu;
use tracing::warn;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FlightServerError {
    #[snafu(transparent)]
    Flight {
        source: arrow_flight::error::FlightError,
    },
    #[snafu(transparent)]
    Ingest { source: IngestError },
    #[snafu(display("Invalid Flight descriptor: {message}"))]
    InvalidDescriptor { message: String },
    #[snafu(display("Failed to decode Flight command"))]
    DecodeCommand { source: serde_json::Error },
    #[snafu(display("Failed to encode Flight metadata"))]
    EncodeMetadata { source: serde_json::Error },
    #[snafu(display("The first message must carry a Flight descriptor"))]
    MissingDescriptor,
    #[snafu(display("Timed out waiting for the Flight descriptor"))]
    DescriptorTimeout,
    #[snafu(display("The server is shutting down"))]
    ShuttingDown,
}

impl From<FlightServerError> for tonic::Status {
    fn from(err: FlightServerError) -> Self {
        let code = match &err {
            FlightServerError::Ingest { source } => match source {
                IngestError::Timeout { .. } => tonic::Code::DeadlineExceeded,
                IngestError::Cancelled { .. } => tonic::Code::Cancelled,
                _ => match source.kind() {
                    ErrorKind::NotFound => tonic::Code::NotFound,
                    ErrorKind::Validation => tonic::Code::InvalidArgument,
                    ErrorKind::Cancelled => tonic::Code::Cancelled,
                    ErrorKind::Internal => tonic::Code::Internal,
                },
            },
            FlightServerError::Flight { .. }
            | FlightServerError::InvalidDescriptor { .. }
            | FlightServerError::DecodeCommand { .. }
            | FlightServerError::MissingDescriptor => tonic::Code::InvalidArgument,
            FlightServerError::DescriptorTimeout => tonic::Code::DeadlineExceeded,
            FlightServerError::ShuttingDown => tonic::Code::Cancelled,
            FlightServerError::EncodeMetadata { .. } => tonic::Code::Internal,
        };

        let message = match &err {
            FlightServerError::Ingest { source } => source.report(),
            _ => err.to_string(),
        };

        if code == tonic::Code::Internal {
            warn!(err = ?err, "flight request failed");
        }

        tonic::Status::new(code, message)
    }
}
