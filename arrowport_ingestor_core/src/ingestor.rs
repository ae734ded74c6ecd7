use std::sync::Arc;

use arrowport_store::{LoadMode, StoreError, StoreGateway, Transaction};
use arrowport_streams::{StreamPolicy, StreamRegistry};
use tracing::{debug, info, warn};

use crate::{
    batch::DecodedBatch,
    error::{IngestError, Result},
    metrics::{IngestionMetrics, IngestionMetricsSink, IngestionRecord},
    session::ChunkedSession,
    types::IngestionResult,
};

/// Routes decoded batches to their stream's destination table.
///
/// Every call runs in a single store transaction: either all the batches are
/// loaded or none is.
#[derive(Clone)]
pub struct IngestionCoordinator {
    registry: StreamRegistry,
    gateway: Arc<StoreGateway>,
    metrics: Arc<dyn IngestionMetricsSink>,
}

/// Tracks what a transaction loaded so far for one stream.
pub(crate) struct IngestionProgress {
    stream: String,
    policy: Arc<StreamPolicy>,
    created: bool,
    rows: u64,
    bytes: u64,
}

impl IngestionCoordinator {
    pub fn new(registry: StreamRegistry, gateway: Arc<StoreGateway>) -> Self {
        Self {
            registry,
            gateway,
            metrics: Arc::new(IngestionMetrics::default()),
        }
    }

    /// Replace the sink receiving the metrics of committed ingestions.
    pub fn with_metrics(mut self, metrics: Arc<dyn IngestionMetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<StoreGateway> {
        &self.gateway
    }

    /// Returns the policy of `stream`.
    pub fn resolve(&self, stream: &str) -> Result<Arc<StreamPolicy>> {
        self.registry
            .lookup(stream)
            .ok_or_else(|| IngestError::UnknownStream {
                stream: stream.to_string(),
            })
    }

    /// Ingest `batches` into the destination configured for `stream`.
    pub async fn ingest(
        &self,
        stream: &str,
        batches: impl IntoIterator<Item = DecodedBatch>,
    ) -> Result<IngestionResult> {
        let policy = match self.resolve(stream) {
            Ok(policy) => policy,
            Err(err) => {
                warn!(stream, "rejected batches for unknown stream");
                return Err(err);
            }
        };

        self.ingest_with_policy(stream, policy, batches).await
    }

    /// Ingest `batches` using an explicit policy instead of the registry.
    pub async fn ingest_with_policy(
        &self,
        stream: &str,
        policy: Arc<StreamPolicy>,
        batches: impl IntoIterator<Item = DecodedBatch>,
    ) -> Result<IngestionResult> {
        let mut progress = IngestionProgress::new(stream, policy);

        let mut tx = self
            .gateway
            .begin()
            .await
            .map_err(|source| progress.failed(source))?;

        for batch in batches {
            if let Err(err) = progress.apply(&mut tx, &batch) {
                rollback(tx, stream);
                return Err(err);
            }
        }

        tx.commit().map_err(|source| progress.failed(source))?;

        Ok(progress.complete(self.metrics.as_ref()))
    }

    /// Open a session that ingests the chunks of a long-lived stream.
    pub fn open_session(&self, stream: &str) -> Result<ChunkedSession> {
        let policy = self.resolve(stream)?;

        debug!(stream, destination = %policy.target_table(), "opened session");

        Ok(ChunkedSession::new(
            IngestionProgress::new(stream, policy),
            self.gateway.clone(),
            self.metrics.clone(),
        ))
    }
}

impl IngestionProgress {
    pub(crate) fn new(stream: &str, policy: Arc<StreamPolicy>) -> Self {
        Self {
            stream: stream.to_string(),
            policy,
            created: false,
            rows: 0,
            bytes: 0,
        }
    }

    pub(crate) fn stream(&self) -> &str {
        &self.stream
    }

    pub(crate) fn policy(&self) -> &Arc<StreamPolicy> {
        &self.policy
    }

    pub(crate) fn rows(&self) -> u64 {
        self.rows
    }

    /// Load `batch` in slices of at most the policy's chunk size.
    ///
    /// The first load creates the destination if needed.
    pub(crate) fn apply(&mut self, tx: &mut Transaction, batch: &DecodedBatch) -> Result<()> {
        let destination = self.policy.target_table().clone();

        for chunk in batch.chunks(self.policy.chunk_size()) {
            let mode = if self.created {
                LoadMode::Append
            } else {
                LoadMode::Create
            };

            let rows = tx
                .load_table(chunk, &destination, mode)
                .map_err(|source| self.failed(source))?;

            self.created = true;
            self.rows += rows as u64;
        }

        self.bytes += batch.encoded_len() as u64;

        Ok(())
    }

    /// Build the error for a store failure, logging it.
    pub(crate) fn failed(&self, source: StoreError) -> IngestError {
        let err = IngestError::ProcessingFailed {
            stream: self.stream.clone(),
            destination: self.policy.target_table().to_string(),
            rows_applied: self.rows,
            source,
        };

        warn!(
            stream = %self.stream,
            destination = %self.policy.target_table(),
            rows_applied = self.rows,
            err = ?err,
            "ingestion failed"
        );

        err
    }

    /// Record the metrics of the committed data and build the result.
    pub(crate) fn complete(&self, metrics: &dyn IngestionMetricsSink) -> IngestionResult {
        metrics.record(&IngestionRecord {
            stream: self.stream.clone(),
            destination: self.policy.target_table().to_string(),
            compression: self.policy.compression_label(),
            rows: self.rows,
            bytes: self.bytes,
        });

        info!(
            stream = %self.stream,
            destination = %self.policy.target_table(),
            rows = self.rows,
            bytes = self.bytes,
            "ingested batches"
        );

        IngestionResult::success(self.rows, self.bytes)
    }
}

pub(crate) fn rollback(tx: Transaction, stream: &str) {
    if let Err(err) = tx.rollback() {
        warn!(stream, err = ?err, "failed to roll back transaction");
    }
}
