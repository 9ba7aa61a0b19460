//! Synchronous data access.
//!
//! [`BlockingDataAccess`] drives a [`DataAccess`] on its own current-thread
//! tokio runtime. It must not be used from inside an async context: blocking
//! on a runtime from within another runtime panics.

use crate::db::reader::blocking_next;
use crate::db::{DataAccess, DataReader, DbTransaction, ReaderOpenError};
use crate::error::{DbError, DbResult};
use crate::models::{Command, DataRecord, DataSet, DataTable, DatabaseType};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

fn build_runtime() -> DbResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))
}

/// Blocking counterpart of [`DataAccess`].
pub struct BlockingDataAccess {
    runtime: Arc<Runtime>,
    access: DataAccess,
}

impl BlockingDataAccess {
    /// Parse `connection_string` and prepare a lazy pool for it.
    pub fn new(connection_string: &str) -> DbResult<Self> {
        let runtime = Arc::new(build_runtime()?);
        let access = {
            let _guard = runtime.enter();
            DataAccess::new(connection_string)?
        };
        Ok(Self { runtime, access })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.access.db_type()
    }

    /// The async access sharing this pool.
    pub fn access(&self) -> &DataAccess {
        &self.access
    }

    pub fn ping(&self) -> DbResult<()> {
        self.runtime.block_on(self.access.ping())
    }

    pub fn execute_data_set(&self, command: &Command) -> DbResult<DataSet> {
        self.runtime.block_on(self.access.execute_data_set(command))
    }

    pub fn execute_data_table(&self, command: &Command) -> DbResult<DataTable> {
        self.runtime.block_on(self.access.execute_data_table(command))
    }

    pub fn execute_scalar(&self, command: &Command) -> DbResult<JsonValue> {
        self.runtime.block_on(self.access.execute_scalar(command))
    }

    pub fn execute_non_query(&self, command: &Command) -> DbResult<u64> {
        self.runtime.block_on(self.access.execute_non_query(command))
    }

    pub fn execute_output_values(&self, command: &Command) -> DbResult<Vec<JsonValue>> {
        self.runtime
            .block_on(self.access.execute_output_values(command))
    }

    pub fn execute_output_value(&self, command: &Command) -> DbResult<JsonValue> {
        self.runtime
            .block_on(self.access.execute_output_value(command))
    }

    pub fn execute_reader(&self, command: &Command) -> DbResult<BlockingReader> {
        let reader = self.runtime.block_on(self.access.execute_reader(command))?;
        Ok(BlockingReader {
            runtime: Arc::clone(&self.runtime),
            reader,
        })
    }

    pub fn begin(&self) -> DbResult<BlockingTransaction> {
        let tx = self.runtime.block_on(self.access.begin())?;
        Ok(BlockingTransaction {
            runtime: Arc::clone(&self.runtime),
            tx,
        })
    }

    /// Close the pool.
    pub fn close(self) {
        self.runtime.block_on(self.access.close());
    }
}

/// Blocking counterpart of [`DbTransaction`].
#[derive(Debug)]
pub struct BlockingTransaction {
    runtime: Arc<Runtime>,
    tx: DbTransaction,
}

impl BlockingTransaction {
    pub fn db_type(&self) -> DatabaseType {
        self.tx.db_type()
    }

    pub fn commit(self) -> DbResult<()> {
        self.runtime.block_on(self.tx.commit())
    }

    pub fn rollback(self) -> DbResult<()> {
        self.runtime.block_on(self.tx.rollback())
    }

    pub fn execute_data_set(&mut self, command: &Command) -> DbResult<DataSet> {
        self.runtime.block_on(self.tx.execute_data_set(command))
    }

    pub fn execute_data_table(&mut self, command: &Command) -> DbResult<DataTable> {
        self.runtime.block_on(self.tx.execute_data_table(command))
    }

    pub fn execute_scalar(&mut self, command: &Command) -> DbResult<JsonValue> {
        self.runtime.block_on(self.tx.execute_scalar(command))
    }

    pub fn execute_non_query(&mut self, command: &Command) -> DbResult<u64> {
        self.runtime.block_on(self.tx.execute_non_query(command))
    }

    pub fn execute_output_values(&mut self, command: &Command) -> DbResult<Vec<JsonValue>> {
        self.runtime.block_on(self.tx.execute_output_values(command))
    }

    pub fn execute_output_value(&mut self, command: &Command) -> DbResult<JsonValue> {
        self.runtime.block_on(self.tx.execute_output_value(command))
    }

    /// Stream the rows of `command`; [`BlockingReader::close`] hands the
    /// transaction back.
    pub fn execute_reader(
        self,
        command: &Command,
    ) -> Result<BlockingReader<BlockingTransaction>, ReaderOpenError<BlockingTransaction>> {
        let runtime = self.runtime;
        let result = runtime.block_on(self.tx.execute_reader(command));
        match result {
            Ok(reader) => Ok(BlockingReader { runtime, reader }),
            Err(e) => Err(e.map_transaction(|tx| BlockingTransaction { runtime, tx })),
        }
    }
}

/// Blocking forward-only reader; iterate it to fetch rows.
pub struct BlockingReader<R: BlockingOutput = ()> {
    runtime: Arc<Runtime>,
    reader: DataReader<FromAsync<R>>,
}

impl<R> std::fmt::Debug for BlockingReader<R>
where
    R: BlockingOutput,
    FromAsync<R>: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingReader")
            .field("runtime", &self.runtime)
            .field("reader", &self.reader)
            .finish()
    }
}

/// Maps the async reader's output onto its blocking counterpart.
pub trait BlockingOutput: Sized {
    type Async: Send + 'static;

    fn from_async(runtime: &Arc<Runtime>, output: Self::Async) -> Self;
}

type FromAsync<R> = <R as BlockingOutput>::Async;

impl BlockingOutput for () {
    type Async = ();

    fn from_async(_: &Arc<Runtime>, _: ()) -> Self {}
}

impl BlockingOutput for BlockingTransaction {
    type Async = DbTransaction;

    fn from_async(runtime: &Arc<Runtime>, tx: DbTransaction) -> Self {
        BlockingTransaction {
            runtime: Arc::clone(runtime),
            tx,
        }
    }
}

impl<R: BlockingOutput> BlockingReader<R> {
    /// Stop reading and release the connection (or return the transaction).
    pub fn close(self) -> DbResult<R> {
        let output = self.runtime.block_on(self.reader.close())?;
        Ok(R::from_async(&self.runtime, output))
    }
}

impl<R: BlockingOutput> Iterator for BlockingReader<R> {
    type Item = DbResult<DataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        blocking_next(&self.runtime, &mut self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_scalar_in_memory() {
        let access = BlockingDataAccess::new("sqlite::memory:").unwrap();
        let value = access.execute_scalar(&Command::text("SELECT 40 + 2")).unwrap();
        assert_eq!(value, serde_json::json!(42));
        access.close();
    }

    #[test]
    fn test_blocking_rejects_bad_connection_string() {
        assert!(matches!(
            BlockingDataAccess::new("oracle://scott:tiger@db"),
            Err(DbError::InvalidInput { .. })
        ));
    }
}
