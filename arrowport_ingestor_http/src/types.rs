//! Request and response types for the HTTP ingestor endpoints.

use arrowport_ingestor_core::SchemaDescriptor;
use arrowport_streams::StreamConfig;
use serde::{Deserialize, Serialize};

/// Request payload for the /stream/{stream_name} endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Inline policy for the stream.
    ///
    /// If None, the policy configured for the stream is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<StreamConfig>,
    pub batch: BatchPayload,
}

/// An Arrow batch and the schema it's expected to have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload {
    pub schema: SchemaDescriptor,
    /// Base64 encoded Arrow IPC stream.
    pub data: String,
}

/// Response payload for the /streams endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamsResponse {
    pub generation: u64,
    pub streams: Vec<StreamEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEntry {
    pub name: String,
    pub config: StreamConfig,
}
