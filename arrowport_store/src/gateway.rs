use std::{fmt, sync::Arc};

use arrow::array::RecordBatch;
use arrowport_streams::TableName;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::{
    StoreConnection, StoreFactory, TableDescription,
    error::{Result, StoreError},
};

/// Name under which a batch is exposed to the store while it's loaded.
pub const SOURCE_NAME: &str = "arrowport_source";

type Session = Arc<Mutex<Box<dyn StoreConnection>>>;

/// How a batch is loaded into its destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Create the destination from the batch's schema if it doesn't exist,
    /// then insert the batch. Existing rows are kept.
    Create,
    /// Insert the batch into an existing destination.
    Append,
}

/// Owns the process' single store session.
///
/// The session is opened on first use and reused afterwards. Only one
/// transaction runs at a time: callers of [`StoreGateway::begin`] wait for the
/// current transaction to finish.
pub struct StoreGateway {
    factory: Arc<dyn StoreFactory>,
    session: OnceCell<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Active,
    Aborted,
    Finished,
}

/// An open transaction on the store session.
///
/// The transaction holds exclusive access to the session until it's
/// committed, rolled back or dropped. Dropping an unfinished transaction rolls
/// it back.
pub struct Transaction {
    conn: OwnedMutexGuard<Box<dyn StoreConnection>>,
    state: TransactionState,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Create => "create",
            LoadMode::Append => "append",
        }
    }
}

impl StoreGateway {
    pub fn new(factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            factory,
            session: OnceCell::new(),
        }
    }

    /// Whether the session has been opened.
    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    async fn session(&self) -> Result<Session> {
        let session = self
            .session
            .get_or_try_init(|| async {
                debug!("opening store session");
                let conn = self.factory.connect().await?;
                Ok::<_, StoreError>(Arc::new(Mutex::new(conn)))
            })
            .await?;
        Ok(session.clone())
    }

    /// Begin a new transaction, waiting for the current one to finish.
    pub async fn begin(&self) -> Result<Transaction> {
        let session = self.session().await?;
        let mut conn = session.lock_owned().await;
        conn.begin()?;

        Ok(Transaction {
            conn,
            state: TransactionState::Active,
        })
    }

    /// Run `f` inside a transaction.
    ///
    /// The transaction is committed if `f` succeeds and rolled back if it
    /// fails.
    pub async fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tx = self.begin().await?;

        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(err = ?rollback_err, "failed to roll back transaction");
                }
                Err(err)
            }
        }
    }

    /// Describe a table outside of any explicit transaction.
    pub async fn describe_table(&self, name: &str) -> Result<Option<TableDescription>> {
        let session = self.session().await?;
        let mut conn = session.lock().await;
        conn.describe_table(name)
    }
}

impl fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGateway")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    /// Whether a statement in this transaction failed.
    pub fn is_aborted(&self) -> bool {
        self.state == TransactionState::Aborted
    }

    /// Execute a statement inside the transaction.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.ensure_active()?;
        let result = self.conn.execute(sql);
        self.track(result)
    }

    /// Load `batch` into `destination`.
    ///
    /// The batch is exposed to the store as [`SOURCE_NAME`] for the duration
    /// of the load and removed afterwards, whether the load succeeds or not.
    /// Returns the number of rows loaded.
    pub fn load_table(
        &mut self,
        batch: RecordBatch,
        destination: &TableName,
        mode: LoadMode,
    ) -> Result<usize> {
        self.ensure_active()?;

        let num_rows = batch.num_rows();
        let result = self.conn.register_source(SOURCE_NAME, batch);
        self.track(result)?;

        let result = load_statements(destination, mode)
            .iter()
            .try_for_each(|statement| self.conn.execute(statement));

        let cleanup = self.conn.unregister_source(SOURCE_NAME);
        self.track(result)?;

        if let Err(err) = cleanup {
            warn!(err = ?err, source = SOURCE_NAME, "failed to unregister batch source");
        }

        debug!(
            destination = %destination,
            mode = mode.as_str(),
            rows = num_rows,
            "loaded batch"
        );

        Ok(num_rows)
    }

    /// Describe a table as seen from inside the transaction.
    pub fn describe_table(&mut self, name: &str) -> Result<Option<TableDescription>> {
        self.conn.describe_table(name)
    }

    /// Commit the transaction.
    ///
    /// An aborted transaction is rolled back instead and the commit fails.
    pub fn commit(mut self) -> Result<()> {
        if self.is_aborted() {
            self.finish_rollback();
            return Err(StoreError::Aborted);
        }

        self.state = TransactionState::Finished;
        if let Err(err) = self.conn.commit() {
            // The session must be usable by the next transaction.
            if let Err(rollback_err) = self.conn.rollback() {
                debug!(err = ?rollback_err, "rollback after failed commit");
            }
            return Err(err);
        }

        Ok(())
    }

    /// Roll back the transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.state = TransactionState::Finished;
        self.conn.rollback()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Aborted | TransactionState::Finished => Err(StoreError::Aborted),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = TransactionState::Aborted;
        }
        result
    }

    fn finish_rollback(&mut self) {
        self.state = TransactionState::Finished;
        if let Err(err) = self.conn.rollback() {
            warn!(err = ?err, "failed to roll back transaction");
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Finished {
            debug!("rolling back unfinished transaction");
            self.finish_rollback();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn load_statements(destination: &TableName, mode: LoadMode) -> Vec<String> {
    let table = destination.quoted();
    let insert = format!("INSERT INTO {table} SELECT * FROM \"{SOURCE_NAME}\"");

    match mode {
        LoadMode::Append => vec![insert],
        LoadMode::Create => {
            let mut statements = Vec::with_capacity(3);
            if let Some(schema) = destination.schema() {
                statements.push(format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""));
            }
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {table} AS SELECT * FROM \"{SOURCE_NAME}\" LIMIT 0"
            ));
            statements.push(insert);
            statements
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_statements_unqualified() {
        let destination = TableName::new("events").unwrap();

        assert_eq!(
            load_statements(&destination, LoadMode::Create),
            vec![
                "CREATE TABLE IF NOT EXISTS \"events\" AS SELECT * FROM \"arrowport_source\" LIMIT 0",
                "INSERT INTO \"events\" SELECT * FROM \"arrowport_source\"",
            ]
        );
    }

    #[test]
    fn test_load_statements() {
        let destination = TableName::new("analytics.events").unwrap();

        assert_eq!(
            load_statements(&destination, LoadMode::Create),
            vec![
                "CREATE SCHEMA IF NOT EXISTS \"analytics\"",
                "CREATE TABLE IF NOT EXISTS \"analytics\".\"events\" AS SELECT * FROM \"arrowport_source\" LIMIT 0",
                "INSERT INTO \"analytics\".\"events\" SELECT * FROM \"arrowport_source\"",
            ]
        );
        assert_eq!(
            load_statements(&destination, LoadMode::Append),
            vec!["INSERT INTO \"analytics\".\"events\" SELECT * FROM \"arrowport_source\""]
        );
    }
}
