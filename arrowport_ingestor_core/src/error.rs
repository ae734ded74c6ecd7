use arrowport_store::StoreError;
use arrowport_streams::PolicyError;
use snafu::{ErrorCompat, Snafu};

use crate::decode::DecodeError;

/// Categories of errors, used to map errors to transport status codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input, user error.
    Validation,
    /// The stream is not configured.
    NotFound,
    /// Store failures and bugs.
    Internal,
    /// The client went away or stopped sending.
    Cancelled,
}

/// Ingestion error types.
///
/// The message associated with an error is forwarded to the client,
/// for this reason it should contain information that is useful to the user.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// No policy is configured for the stream.
    #[snafu(display("stream '{stream}' not found"))]
    UnknownStream { stream: String },
    /// The payload could not be decoded.
    #[snafu(display("invalid payload for stream '{stream}'"))]
    Decode { stream: String, source: DecodeError },
    /// The policy supplied with the request is invalid.
    #[snafu(display("invalid configuration for stream '{stream}'"))]
    InvalidPolicy { stream: String, source: PolicyError },
    /// The store rejected the data. Nothing was retained.
    #[snafu(display(
        "failed to process stream '{stream}' into '{destination}' after {rows_applied} rows"
    ))]
    ProcessingFailed {
        stream: String,
        destination: String,
        rows_applied: u64,
        source: StoreError,
    },
    /// The session no longer accepts chunks.
    #[snafu(display("session for stream '{stream}' is closed"))]
    SessionClosed { stream: String },
    /// No chunk arrived in time.
    #[snafu(display("timed out waiting for the next chunk of stream '{stream}'"))]
    Timeout { stream: String },
    /// The session was cancelled.
    #[snafu(display("ingestion of stream '{stream}' was cancelled"))]
    Cancelled { stream: String },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownStream { .. } => ErrorKind::NotFound,
            Self::Decode { .. } | Self::InvalidPolicy { .. } | Self::SessionClosed { .. } => {
                ErrorKind::Validation
            }
            Self::ProcessingFailed { .. } => ErrorKind::Internal,
            Self::Timeout { .. } | Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn is_unknown_stream(&self) -> bool {
        matches!(self, Self::UnknownStream { .. })
    }

    /// The error message followed by its causes, on one line.
    pub fn report(&self) -> String {
        ErrorCompat::iter_chain(self)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ")
    }
}
