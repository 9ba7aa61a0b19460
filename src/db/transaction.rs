//! Caller-managed transactions.
//!
//! A [`DbTransaction`] holds a dedicated connection from the start of the
//! transaction until `commit` or `rollback`. Operations run on that
//! connection and leave it open. Dropping an unfinished transaction rolls it
//! back when the connection returns to its pool.

use crate::db::pool::{DbPool, PooledTransaction};
use crate::db::reader::DataReader;
use crate::db::statement::Statement;
use crate::error::{DbError, DbResult};
use crate::models::{Command, DataSet, DataTable, DatabaseType};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Expand one executor call against the transaction's connection.
macro_rules! run_in_transaction {
    ($tx:expr, $command:expr, $op:ident) => {{
        let tx: &mut DbTransaction = $tx;
        let command: &Command = $command;
        let statement = Statement::build(command, tx.db_type())?;
        let query_timeout = command.effective_timeout(tx.default_timeout);
        impl_db_dispatch!(PooledTransaction, &mut tx.inner, |c, backend| {
            backend::$op(&mut **c, &statement, query_timeout).await
        })
    }};
}

/// An open transaction.
pub struct DbTransaction {
    inner: PooledTransaction,
    default_timeout: Duration,
    /// Pool created for this transaction alone, closed when it finishes.
    owned_pool: Option<DbPool>,
}

impl DbTransaction {
    pub(crate) fn new(
        inner: PooledTransaction,
        default_timeout: Duration,
        owned_pool: Option<DbPool>,
    ) -> Self {
        debug!(db_type = %inner.db_type(), "Transaction started");
        Self {
            inner,
            default_timeout,
            owned_pool,
        }
    }

    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        self.inner.db_type()
    }

    /// Timeout used for commands that do not set their own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        let db_type = self.db_type();
        let result = self.inner.commit().await;
        if let Some(pool) = self.owned_pool {
            pool.close().await;
        }
        info!(db_type = %db_type, ok = result.is_ok(), "Transaction committed");
        result
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        let db_type = self.db_type();
        let result = self.inner.rollback().await;
        if let Some(pool) = self.owned_pool {
            pool.close().await;
        }
        info!(db_type = %db_type, ok = result.is_ok(), "Transaction rolled back");
        result
    }

    pub async fn execute_data_set(&mut self, command: &Command) -> DbResult<DataSet> {
        run_in_transaction!(self, command, fill_data_set)
    }

    /// First result set of the command (empty when there is none).
    pub async fn execute_data_table(&mut self, command: &Command) -> DbResult<DataTable> {
        Ok(self.execute_data_set(command).await?.into_first_table())
    }

    /// First column of the first row, `Null` when no row is returned.
    pub async fn execute_scalar(&mut self, command: &Command) -> DbResult<JsonValue> {
        run_in_transaction!(self, command, execute_scalar)
    }

    /// Rows affected by the command.
    pub async fn execute_non_query(&mut self, command: &Command) -> DbResult<u64> {
        run_in_transaction!(self, command, execute_non_query)
    }

    /// Values of every OUTPUT and INPUT/OUTPUT parameter, in declaration order.
    /// Empty when the command declares none.
    pub async fn execute_output_values(&mut self, command: &Command) -> DbResult<Vec<JsonValue>> {
        run_in_transaction!(self, command, execute_output_values)
    }

    /// Value of the first OUTPUT or INPUT/OUTPUT parameter. The command runs
    /// before a missing output parameter is reported.
    pub async fn execute_output_value(&mut self, command: &Command) -> DbResult<JsonValue> {
        let values = self.execute_output_values(command).await?;
        values
            .into_iter()
            .next()
            .ok_or_else(|| DbError::no_output_parameters(&command.text))
    }

    /// Stream the rows of `command`.
    ///
    /// The reader takes the transaction over while rows are produced;
    /// [`DataReader::close`] hands it back. When the reader cannot be opened
    /// the transaction comes back inside the error.
    pub async fn execute_reader(
        self,
        command: &Command,
    ) -> Result<DataReader<DbTransaction>, ReaderOpenError> {
        let db_type = self.db_type();
        if let Err(error) = Statement::build(command, db_type) {
            return Err(ReaderOpenError::new(error, self));
        }
        let query_timeout = command.effective_timeout(self.default_timeout);
        let command = command.clone();
        let mut tx = self;

        Ok(DataReader::spawn(move |sender| async move {
            match Statement::build(&command, db_type) {
                Ok(statement) => {
                    let timed_out =
                        impl_db_dispatch!(PooledTransaction, &mut tx.inner, |c, backend| {
                            backend::stream_rows(&mut **c, &statement, query_timeout, &sender)
                                .await
                        });
                    if timed_out {
                        warn!(db_type = %db_type, "Reader timed out inside a transaction");
                    }
                }
                Err(e) => {
                    let _ = sender.send(Err(e)).await;
                }
            }
            tx
        }))
    }
}

/// A reader that could not be opened, with the transaction it was given.
#[derive(Debug)]
pub struct ReaderOpenError<T = DbTransaction> {
    pub error: DbError,
    pub transaction: T,
}

impl<T> ReaderOpenError<T> {
    pub fn new(error: DbError, transaction: T) -> Self {
        Self { error, transaction }
    }

    pub fn into_parts(self) -> (DbError, T) {
        (self.error, self.transaction)
    }

    pub(crate) fn map_transaction<U>(self, f: impl FnOnce(T) -> U) -> ReaderOpenError<U> {
        ReaderOpenError {
            error: self.error,
            transaction: f(self.transaction),
        }
    }
}

impl<T> std::fmt::Display for ReaderOpenError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl<T: std::fmt::Debug> std::error::Error for ReaderOpenError<T> {}

/// Drops the transaction, which rolls it back.
impl<T> From<ReaderOpenError<T>> for DbError {
    fn from(e: ReaderOpenError<T>) -> Self {
        e.error
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTransaction")
            .field("db_type", &self.db_type())
            .field("default_timeout", &self.default_timeout)
            .field("owns_pool", &self.owned_pool.is_some())
            .finish()
    }
}
