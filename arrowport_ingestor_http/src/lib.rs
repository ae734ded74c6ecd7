//! HTTP ingestor server.
//!
//! This crate provides a server to ingest Arrow batches over HTTP.
//!
//! The server is built using axum and provides a `/stream/{stream_name}`
//! endpoint for batch ingestion, plus a `/streams` endpoint listing the
//! configured streams.

pub mod error;
pub mod ingest;
pub mod streams;
pub mod types;

pub use error::{HttpIngestorError, Result};
pub use types::{BatchPayload, IngestRequest, StreamEntry, StreamsResponse};

use arrowport_ingestor_core::IngestionCoordinator;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::{ingest::ingest_handler, streams::streams_handler};

/// Default maximum size of a request body, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// HTTP ingestor server that receives batches via HTTP POST requests.
pub struct HttpIngestor {
    coordinator: IngestionCoordinator,
    body_limit: usize,
}

impl HttpIngestor {
    pub fn new(coordinator: IngestionCoordinator) -> Self {
        Self {
            coordinator,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Reject request bodies larger than `body_limit` bytes.
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/stream/{stream_name}", post(ingest_handler))
            .route("/streams", get(streams_handler))
            .layer(DefaultBodyLimit::max(self.body_limit))
            .with_state(self.coordinator)
    }
}
