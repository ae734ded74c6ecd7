//! Chunked ingestion of long-lived streams.
//!
//! A [`ChunkedSession`] applies each chunk to the store as soon as it
//! arrives, inside one transaction spanning the whole session. The session
//! ends either committed, with [`ChunkedSession::finish`], or aborted with
//! nothing retained.

use std::{fmt, pin::pin, sync::Arc, time::Duration};

use arrowport_store::{StoreGateway, Transaction};
use arrowport_streams::StreamPolicy;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    batch::DecodedBatch,
    error::{CancelledSnafu, IngestError, Result, SessionClosedSnafu, TimeoutSnafu},
    ingestor::{IngestionProgress, rollback},
    metrics::IngestionMetricsSink,
    types::IngestionResult,
};

/// Default time to wait for the next chunk before aborting the session.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No chunk received yet.
    Open,
    /// At least one chunk applied, the transaction is open.
    Receiving,
    /// Committed.
    Completed,
    /// Rolled back. No further chunks are accepted.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Maximum time to wait for the next chunk.
    pub chunk_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }
}

/// Ingests the chunks of one stream within a single transaction.
///
/// The transaction starts with the first chunk. Dropping the session before
/// it finishes rolls it back.
pub struct ChunkedSession {
    progress: IngestionProgress,
    gateway: Arc<StoreGateway>,
    metrics: Arc<dyn IngestionMetricsSink>,
    tx: Option<Transaction>,
    state: SessionState,
}

impl ChunkedSession {
    pub(crate) fn new(
        progress: IngestionProgress,
        gateway: Arc<StoreGateway>,
        metrics: Arc<dyn IngestionMetricsSink>,
    ) -> Self {
        Self {
            progress,
            gateway,
            metrics,
            tx: None,
            state: SessionState::Open,
        }
    }

    pub fn stream(&self) -> &str {
        self.progress.stream()
    }

    pub fn policy(&self) -> &Arc<StreamPolicy> {
        self.progress.policy()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Rows applied so far. They are not visible until the session finishes.
    pub fn rows_applied(&self) -> u64 {
        self.progress.rows()
    }

    /// Apply `chunk` to the destination.
    ///
    /// A failing chunk aborts the session and discards every chunk applied
    /// before it.
    pub async fn apply_chunk(&mut self, chunk: DecodedBatch) -> Result<()> {
        match self.state {
            SessionState::Open | SessionState::Receiving => {}
            SessionState::Completed | SessionState::Aborted => {
                return SessionClosedSnafu {
                    stream: self.stream(),
                }
                .fail();
            }
        }

        let mut tx = match self.tx.take() {
            Some(tx) => tx,
            None => match self.gateway.begin().await {
                Ok(tx) => tx,
                Err(source) => {
                    self.state = SessionState::Aborted;
                    return Err(self.progress.failed(source));
                }
            },
        };

        if let Err(err) = self.progress.apply(&mut tx, &chunk) {
            rollback(tx, self.progress.stream());
            self.state = SessionState::Aborted;
            return Err(err);
        }

        self.tx = Some(tx);
        self.state = SessionState::Receiving;
        debug!(
            stream = self.stream(),
            rows = chunk.num_rows(),
            rows_applied = self.rows_applied(),
            "applied chunk"
        );

        Ok(())
    }

    /// Roll back everything applied so far. Calling `abort` on a finished
    /// session has no effect.
    pub fn abort(&mut self) {
        if self.state == SessionState::Completed {
            return;
        }

        if let Some(tx) = self.tx.take() {
            warn!(
                stream = self.stream(),
                rows_discarded = self.rows_applied(),
                "aborting session"
            );
            rollback(tx, self.progress.stream());
        }

        self.state = SessionState::Aborted;
    }

    /// Commit the session and record its metrics.
    pub async fn finish(mut self) -> Result<IngestionResult> {
        if self.state == SessionState::Aborted {
            return SessionClosedSnafu {
                stream: self.stream(),
            }
            .fail();
        }

        if let Some(tx) = self.tx.take() {
            if let Err(source) = tx.commit() {
                self.state = SessionState::Aborted;
                return Err(self.progress.failed(source));
            }
        }

        self.state = SessionState::Completed;

        Ok(self.progress.complete(self.metrics.as_ref()))
    }
}

impl fmt::Debug for ChunkedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedSession")
            .field("stream", &self.stream())
            .field("state", &self.state)
            .field("rows_applied", &self.rows_applied())
            .finish_non_exhaustive()
    }
}

/// Drive `session` with the chunks produced by `chunks`.
///
/// The session is aborted if a chunk fails to decode or apply, if no chunk
/// arrives within `options.chunk_timeout`, or if `ct` is cancelled. It's
/// committed once `chunks` ends.
pub async fn run_session<S>(
    mut session: ChunkedSession,
    chunks: S,
    options: SessionOptions,
    ct: CancellationToken,
) -> Result<IngestionResult>
where
    S: Stream<Item = Result<DecodedBatch>>,
{
    let mut chunks = pin!(chunks);

    loop {
        let next = tokio::select! {
            _ = ct.cancelled() => None,
            next = tokio::time::timeout(options.chunk_timeout, chunks.next()) => Some(next),
        };

        let chunk = match next {
            None => {
                let err = CancelledSnafu {
                    stream: session.stream(),
                }
                .build();
                return abort_with(session, err);
            }
            Some(Err(_)) => {
                let err = TimeoutSnafu {
                    stream: session.stream(),
                }
                .build();
                return abort_with(session, err);
            }
            Some(Ok(None)) => break,
            Some(Ok(Some(Err(err)))) => return abort_with(session, err),
            Some(Ok(Some(Ok(chunk)))) => chunk,
        };

        let applied = tokio::select! {
            _ = ct.cancelled() => None,
            applied = session.apply_chunk(chunk) => Some(applied),
        };

        match applied {
            None => {
                let err = CancelledSnafu {
                    stream: session.stream(),
                }
                .build();
                return abort_with(session, err);
            }
            // The session aborted itself.
            Some(Err(err)) => return Err(err),
            Some(Ok(())) => {}
        }
    }

    session.finish().await
}

fn abort_with(mut session: ChunkedSession, err: IngestError) -> Result<IngestionResult> {
    session.abort();
    warn!(err = ?err, "session aborted");
    Err(err)
}
