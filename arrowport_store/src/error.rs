use std::{path::PathBuf, sync::Arc};

use snafu::Snafu;

/// Store error types.
///
/// Errors are cheap to clone so that they can be attached to the ingestion
/// errors reported to clients.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// Failed to open the store.
    #[snafu(display("failed to open store at {}", location.display()))]
    Connect {
        location: PathBuf,
        #[snafu(source(from(duckdb::Error, Arc::new)))]
        source: Arc<duckdb::Error>,
    },
    /// A statement was rejected by the store.
    #[snafu(display("statement failed: {statement}"))]
    Statement {
        statement: String,
        #[snafu(source(from(duckdb::Error, Arc::new)))]
        source: Arc<duckdb::Error>,
    },
    /// Transaction control failed.
    #[snafu(display("failed to {operation} transaction"))]
    Transaction {
        operation: &'static str,
        #[snafu(source(from(duckdb::Error, Arc::new)))]
        source: Arc<duckdb::Error>,
    },
    /// A previous statement in the transaction failed.
    #[snafu(display("transaction aborted by a previous error"))]
    Aborted,
    /// Failed to create the directory holding the store.
    #[snafu(display("failed to create directory {}", path.display()))]
    CreateDirectory {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Arc::new)))]
        source: Arc<std::io::Error>,
    },
    /// Failed to create the temporary store location.
    #[snafu(display("failed to create temporary store directory"))]
    TemporaryDirectory {
        #[snafu(source(from(std::io::Error, Arc::new)))]
        source: Arc<std::io::Error>,
    },
    /// Internal store error.
    #[snafu(display("internal store error: {message}"))]
    Internal { message: String },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
