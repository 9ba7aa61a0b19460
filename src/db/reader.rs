//! Forward-only streaming reader.
//!
//! A [`DataReader`] is fed by a background task that owns the connection (or
//! the transaction) for as long as rows are being produced. Rows arrive over
//! a bounded channel, so a slow consumer applies back-pressure to the fetch.

use crate::error::{DbError, DbResult};
use crate::models::DataRecord;
use futures_util::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Rows buffered between the producer task and the reader.
pub const READER_BUFFER_ROWS: usize = 64;

/// Forward-only reader over the rows of a command.
///
/// Rows of every result set are produced in order; a record's
/// [`DataRecord::columns`] changes when a new result set starts.
///
/// `R` is what the producer hands back on [`close`](Self::close): `()` for
/// readers that own a pooled connection, the
/// [`DbTransaction`](crate::db::DbTransaction) for transactional readers.
/// Dropping a transactional reader without closing it rolls the transaction
/// back.
#[derive(Debug)]
pub struct DataReader<R = ()> {
    receiver: mpsc::Receiver<DbResult<DataRecord>>,
    task: JoinHandle<R>,
}

impl<R: Send + 'static> DataReader<R> {
    /// Spawn `producer` on the current runtime and read what it sends.
    pub(crate) fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<DbResult<DataRecord>>) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(READER_BUFFER_ROWS);
        let task = tokio::spawn(producer(sender));
        Self { receiver, task }
    }

    /// Advance to the next record. `Ok(None)` once every row was read.
    pub async fn read(&mut self) -> DbResult<Option<DataRecord>> {
        self.receiver.recv().await.transpose()
    }

    /// Read the remaining records into memory.
    pub async fn read_all(&mut self) -> DbResult<Vec<DataRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Stop reading and wait for the producer to release its connection.
    ///
    /// Rows not yet read are discarded.
    pub async fn close(mut self) -> DbResult<R> {
        self.receiver.close();
        self.task
            .await
            .map_err(|e| DbError::internal(format!("Reader task failed: {}", e)))
    }
}

impl<R> Stream for DataReader<R> {
    type Item = DbResult<DataRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Blocking side of a reader, driven by the runtime of the caller.
pub(crate) fn blocking_next<R>(
    runtime: &tokio::runtime::Runtime,
    reader: &mut DataReader<R>,
) -> Option<DbResult<DataRecord>> {
    runtime.block_on(reader.receiver.recv())
}
