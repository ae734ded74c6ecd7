//! The ingestion pipeline.
//!
//! Payloads are decoded into [`DecodedBatch`]es by [`decode`], then routed
//! by the [`IngestionCoordinator`] to the destination table configured for
//! their stream. Long-lived streams go through a [`ChunkedSession`].
pub mod batch;
pub mod decode;
pub mod error;
pub mod ingestor;
pub mod metrics;
pub mod session;
pub mod types;

pub mod test_utils;

pub use batch::DecodedBatch;
pub use decode::{DecodeError, FieldDescriptor, SchemaDescriptor, decode, encode, validate};
pub use error::{ErrorKind, IngestError, Result};
pub use ingestor::IngestionCoordinator;
pub use metrics::{IngestionMetrics, IngestionMetricsSink, IngestionRecord};
pub use session::{
    ChunkedSession, DEFAULT_CHUNK_TIMEOUT, SessionOptions, SessionState, run_session,
};
pub use types::{IngestionResult, IngestionStatus};
