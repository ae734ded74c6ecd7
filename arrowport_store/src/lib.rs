//! Access to the embedded analytical store.
//!
//! The store is reached through the [`StoreConnection`] trait, which is the
//! whole surface the ingestion pipeline needs: statements, transaction
//! control and a way to expose an Arrow batch as a queryable source.
//!
//! Connections are created by a [`StoreFactory`]. The [`StoreGateway`] owns
//! the single connection of the process and hands out [`Transaction`]s.

mod error;
mod gateway;
mod local;

use arrow::array::RecordBatch;

pub use self::error::{Result, StoreError};
pub use self::gateway::{LoadMode, SOURCE_NAME, StoreGateway, Transaction};
pub use self::local::{
    DuckDbConnection, DuckDbFactory, InMemoryDuckDbFactory, TemporaryDuckDbFactory,
};

/// Column names and types of a table, plus its row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    /// `(name, type)` pairs, in column order.
    pub columns: Vec<(String, String)>,
    pub num_rows: u64,
}

/// A connection to the analytical store.
///
/// Implementations are synchronous. The gateway serializes access, so a
/// connection is only ever used by one caller at a time.
pub trait StoreConnection: Send {
    /// Execute one or more statements that don't return rows.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Expose `batch` as a source table named `name`.
    fn register_source(&mut self, name: &str, batch: RecordBatch) -> Result<()>;

    /// Remove the source table registered as `name`. Missing sources are
    /// ignored.
    fn unregister_source(&mut self, name: &str) -> Result<()>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Describe the table `name` (`table` or `schema.table`), or `None` if it
    /// doesn't exist.
    fn describe_table(&mut self, name: &str) -> Result<Option<TableDescription>>;
}

/// Factory trait for opening store connections.
#[async_trait::async_trait]
pub trait StoreFactory: Send + Sync {
    /// Open a new connection to the store.
    async fn connect(&self) -> Result<Box<dyn StoreConnection>>;
}
