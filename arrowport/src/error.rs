use std::net::AddrParseError;

use arrowport_flight::FlightServerError;
use arrowport_ingestor_core::DecodeError;
use arrowport_observability::ObservabilityError;
use arrowport_streams::{ConfigError, PolicyError};
use axum::http::uri::InvalidUri;
use snafu::Snafu;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid {name} argument: {message}"))]
    InvalidArgument { name: &'static str, message: String },
    #[snafu(display("Invalid stream policy"))]
    Policy { source: PolicyError },
    #[snafu(display("Invalid stream definitions"))]
    Config { source: ConfigError },
    #[snafu(display("Failed to initialize observability"))]
    Observability { source: ObservabilityError },
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },
    #[snafu(display("Invalid remote URL"))]
    InvalidRemoteUrl { source: InvalidUri },
    #[snafu(display("Invalid server URL"))]
    InvalidServerUrl { source: AddrParseError },
    #[snafu(display("Connection error"))]
    Connection { source: tonic::transport::Error },
    #[snafu(display("Tonic server error"))]
    TonicServer { source: tonic::transport::Error },
    #[snafu(display("HTTP client error"))]
    HttpClient { source: reqwest::Error },
    #[snafu(display("Server responded with {status}: {message}"))]
    Response { status: u16, message: String },
    #[snafu(display("Arrow error"))]
    Arrow { source: arrow::error::ArrowError },
    #[snafu(display("Failed to encode batch"))]
    Encode { source: DecodeError },
    #[snafu(display("Flight error"))]
    Flight {
        source: arrow_flight::error::FlightError,
    },
    #[snafu(display("Invalid Flight response"))]
    FlightResponse { source: FlightServerError },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
