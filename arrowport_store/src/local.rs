//! DuckDB store implementation.
//!
//! We provide a `DuckDbFactory` that opens a database file on the local file
//! system, an `InMemoryDuckDbFactory` for databases that live only as long as
//! their connection, and a `TemporaryDuckDbFactory` that places the database
//! file in a temporary directory that is cleaned up when the factory is
//! dropped. The last two are useful for testing and development.

use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use duckdb::{
    Connection, params,
    vtab::{arrow::ArrowVTab, arrow_recordbatch_to_query_params},
};
use snafu::ResultExt;
use tempfile::TempDir;
use tracing::debug;

use arrowport_streams::TableName;

use crate::{
    StoreConnection, StoreFactory, TableDescription,
    error::{
        ConnectSnafu, CreateDirectorySnafu, Result, StatementSnafu, StoreError,
        TemporaryDirectorySnafu, TransactionSnafu,
    },
};

/// Name of the table function used to scan Arrow data.
const ARROW_SCAN_FUNCTION: &str = "arrow";

/// Maximum number of rows the Arrow scan function reads from one batch,
/// the size of a DuckDB vector.
const ARROW_SCAN_ROWS: usize = 2048;

/// Schema of unqualified table names.
const DEFAULT_SCHEMA: &str = "main";

/// A connection to a DuckDB database.
pub struct DuckDbConnection {
    conn: Connection,
}

/// Factory for DuckDB databases stored in a file.
#[derive(Debug, Clone)]
pub struct DuckDbFactory {
    path: PathBuf,
}

/// Factory for in-memory DuckDB databases.
///
/// Every connection gets its own, empty, database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDuckDbFactory;

/// Factory for DuckDB databases stored in a temporary directory.
///
/// The directory, and with it the database, is removed when the factory is
/// dropped.
#[derive(Debug)]
pub struct TemporaryDuckDbFactory {
    _temp_dir: TempDir,
    factory: DuckDbFactory,
}

impl DuckDbConnection {
    /// Wrap an open connection, registering the Arrow scan function.
    pub fn new(conn: Connection, location: &Path) -> Result<Self> {
        conn.register_table_function::<ArrowVTab>(ARROW_SCAN_FUNCTION)
            .context(ConnectSnafu { location })?;
        Ok(Self { conn })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).context(ConnectSnafu { location: path })?;
        Self::new(conn, path)
    }

    pub fn open_in_memory() -> Result<Self> {
        let location = Path::new(":memory:");
        let conn = Connection::open_in_memory().context(ConnectSnafu { location })?;
        Self::new(conn, location)
    }

    fn count_rows(&self, name: &TableName) -> Result<u64> {
        let statement = format!("SELECT count(*) FROM {}", name.quoted());
        let count: i64 = self
            .conn
            .query_row(&statement, [], |row| row.get(0))
            .context(StatementSnafu {
                statement: &statement,
            })?;
        Ok(count.max(0) as u64)
    }
}

impl StoreConnection for DuckDbConnection {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .context(StatementSnafu { statement: sql })
    }

    fn register_source(&mut self, name: &str, batch: RecordBatch) -> Result<()> {
        let create =
            format!("CREATE TEMP TABLE \"{name}\" AS SELECT * FROM {ARROW_SCAN_FUNCTION}(?, ?)");
        let insert = format!(
            "INSERT INTO temp.main.\"{name}\" SELECT * FROM {ARROW_SCAN_FUNCTION}(?, ?)"
        );

        let num_rows = batch.num_rows();
        let mut offset = 0;
        loop {
            let len = ARROW_SCAN_ROWS.min(num_rows - offset);
            let statement = if offset == 0 { &create } else { &insert };
            let params = arrow_recordbatch_to_query_params(batch.slice(offset, len));
            self.conn
                .execute(statement, params)
                .context(StatementSnafu { statement })?;

            offset += len;
            if offset >= num_rows {
                break;
            }
        }

        Ok(())
    }

    fn unregister_source(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS temp.main.\"{name}\""))
    }

    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .context(TransactionSnafu { operation: "begin" })
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context(TransactionSnafu {
                operation: "commit",
            })
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context(TransactionSnafu {
                operation: "rollback",
            })
    }

    fn describe_table(&mut self, name: &str) -> Result<Option<TableDescription>> {
        let name = TableName::new(name).map_err(|err| StoreError::internal(err.to_string()))?;
        let schema = name.schema().unwrap_or(DEFAULT_SCHEMA);

        let statement = "SELECT column_name, data_type FROM duckdb_columns() \
             WHERE schema_name = ? AND table_name = ? ORDER BY column_index";
        let mut query = self
            .conn
            .prepare(statement)
            .context(StatementSnafu { statement })?;
        let columns = query
            .query_map(params![schema, name.table()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .context(StatementSnafu { statement })?;

        if columns.is_empty() {
            return Ok(None);
        }

        let num_rows = self.count_rows(&name)?;

        Ok(Some(TableDescription { columns, num_rows }))
    }
}

impl DuckDbFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StoreFactory for DuckDbFactory {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(CreateDirectorySnafu { path: parent })?;
        }

        debug!(path = %self.path.display(), "opening store");
        let conn = DuckDbConnection::open(&self.path)?;
        Ok(Box::new(conn))
    }
}

impl InMemoryDuckDbFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StoreFactory for InMemoryDuckDbFactory {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        let conn = DuckDbConnection::open_in_memory()?;
        Ok(Box::new(conn))
    }
}

impl TemporaryDuckDbFactory {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context(TemporaryDirectorySnafu)?;
        let factory = DuckDbFactory::new(temp_dir.path().join("arrowport.duckdb"));

        Ok(Self {
            _temp_dir: temp_dir,
            factory,
        })
    }

    pub fn path(&self) -> &Path {
        self.factory.path()
    }
}

#[async_trait::async_trait]
impl StoreFactory for TemporaryDuckDbFactory {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        self.factory.connect().await
    }
}
