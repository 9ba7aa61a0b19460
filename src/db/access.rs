//! Connection-string based data access.
//!
//! [`DataAccess`] owns a lazy pool for one connection string. Every
//! non-transactional operation follows the same template: check out a
//! connection, build the statement, execute it, shape the result and release
//! the connection whatever the outcome.

use crate::db::pool::{DbPool, PooledConnection};
use crate::db::reader::DataReader;
use crate::db::statement::Statement;
use crate::db::transaction::DbTransaction;
use crate::error::{DbError, DbResult};
use crate::models::{Command, ConnectionConfig, DataSet, DataTable, DatabaseType};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Expand one executor call on a freshly checked-out connection.
macro_rules! run_pooled {
    ($access:expr, $command:expr, $op:ident) => {{
        let access: &DataAccess = $access;
        let command: &Command = $command;
        let statement = Statement::build(command, access.db_type())?;
        let query_timeout = access.timeout_for(command);
        let mut conn = access.open_connection().await?;
        let result = impl_db_dispatch!(PooledConnection, &mut conn, |c, backend| {
            backend::$op(&mut **c, &statement, query_timeout).await
        });
        access.finish(conn, &result).await;
        result
    }};
}

/// Data access for one connection string.
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct DataAccess {
    pool: DbPool,
    config: ConnectionConfig,
}

impl DataAccess {
    /// Parse `connection_string` and prepare a lazy pool for it.
    ///
    /// No connection is opened here. Must be called from within a tokio
    /// runtime.
    pub fn new(connection_string: &str) -> DbResult<Self> {
        Self::from_config(ConnectionConfig::parse(connection_string)?)
    }

    pub fn from_config(config: ConnectionConfig) -> DbResult<Self> {
        let pool = DbPool::connect_lazy(&config)?;
        Ok(Self { pool, config })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.config.db_type
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Timeout used for commands that do not set their own.
    pub fn default_timeout(&self) -> Duration {
        self.config.pool_options.command_timeout()
    }

    fn timeout_for(&self, command: &Command) -> Duration {
        command.effective_timeout(self.default_timeout())
    }

    fn pooling(&self) -> bool {
        self.config.pool_options.pooling_or_default()
    }

    /// Check a connection out of the pool.
    pub async fn open_connection(&self) -> DbResult<PooledConnection> {
        self.pool.acquire().await
    }

    /// Release a connection obtained from [`open_connection`](Self::open_connection).
    pub async fn close_connection(&self, conn: PooledConnection) {
        conn.release(!self.pooling()).await;
    }

    /// Release after an operation. A connection whose command timed out may
    /// still be busy, so it is never reused.
    async fn finish<T>(&self, conn: PooledConnection, result: &DbResult<T>) {
        let timed_out = matches!(result, Err(DbError::Timeout { .. }));
        if timed_out {
            warn!(db_type = %self.db_type(), "Discarding connection after timeout");
        }
        conn.release(timed_out || !self.pooling()).await;
    }

    /// Open and release one connection.
    pub async fn ping(&self) -> DbResult<()> {
        let conn = self.open_connection().await?;
        self.close_connection(conn).await;
        Ok(())
    }

    /// Every row-producing result set of the command.
    pub async fn execute_data_set(&self, command: &Command) -> DbResult<DataSet> {
        run_pooled!(self, command, fill_data_set)
    }

    /// First result set of the command (empty when there is none).
    pub async fn execute_data_table(&self, command: &Command) -> DbResult<DataTable> {
        Ok(self.execute_data_set(command).await?.into_first_table())
    }

    /// First column of the first row, `Null` when no row is returned.
    pub async fn execute_scalar(&self, command: &Command) -> DbResult<JsonValue> {
        run_pooled!(self, command, execute_scalar)
    }

    /// Rows affected by the command.
    pub async fn execute_non_query(&self, command: &Command) -> DbResult<u64> {
        run_pooled!(self, command, execute_non_query)
    }

    /// Values of every OUTPUT and INPUT/OUTPUT parameter, in declaration order.
    ///
    /// A command without output parameters still runs and yields an empty list.
    pub async fn execute_output_values(&self, command: &Command) -> DbResult<Vec<JsonValue>> {
        run_pooled!(self, command, execute_output_values)
    }

    /// Value of the first OUTPUT or INPUT/OUTPUT parameter.
    ///
    /// The command runs before a missing output parameter is reported.
    pub async fn execute_output_value(&self, command: &Command) -> DbResult<JsonValue> {
        let values = self.execute_output_values(command).await?;
        values
            .into_iter()
            .next()
            .ok_or_else(|| DbError::no_output_parameters(&command.text))
    }

    /// Stream the rows of `command`.
    ///
    /// The reader owns its connection and releases it once the rows are
    /// exhausted or the reader is closed or dropped.
    pub async fn execute_reader(&self, command: &Command) -> DbResult<DataReader> {
        let db_type = self.db_type();
        Statement::build(command, db_type)?;
        let query_timeout = self.timeout_for(command);
        let close = !self.pooling();
        let command = command.clone();
        let mut conn = self.open_connection().await?;

        Ok(DataReader::spawn(move |sender| async move {
            let timed_out = match Statement::build(&command, db_type) {
                Ok(statement) => impl_db_dispatch!(PooledConnection, &mut conn, |c, backend| {
                    backend::stream_rows(&mut **c, &statement, query_timeout, &sender).await
                }),
                Err(e) => {
                    let _ = sender.send(Err(e)).await;
                    false
                }
            };
            if timed_out {
                warn!(db_type = %db_type, "Discarding reader connection after timeout");
            }
            conn.release(timed_out || close).await;
            debug!(db_type = %db_type, "Reader connection released");
        }))
    }

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&self) -> DbResult<DbTransaction> {
        let tx = self.pool.begin().await?;
        Ok(DbTransaction::new(tx, self.default_timeout(), None))
    }

    /// Start a transaction that closes this pool when it finishes.
    pub(crate) async fn begin_owned(self) -> DbResult<DbTransaction> {
        let tx = self.pool.begin().await?;
        Ok(DbTransaction::new(tx, self.default_timeout(), Some(self.pool)))
    }

    /// Close the pool. Waits for checked-out connections to come back.
    pub async fn close(&self) {
        self.pool.close().await;
        info!(
            db_type = %self.db_type(),
            url = %self.config.masked_connection_string(),
            "Data access closed"
        );
    }
}
