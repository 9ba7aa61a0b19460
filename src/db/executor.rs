//! Command execution engine.
//!
//! This module runs a prepared [`Statement`] on a borrowed driver connection
//! and shapes the results:
//! - Buffered result sets (`fill_data_set`)
//! - Scalars, affected row counts and output parameter values
//! - Row streaming for readers
//! - Command timeouts
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execution
//! - `postgres`: PostgreSQL-specific execution
//! - `sqlite`: SQLite-specific execution
//!
//! Every submodule is expanded from the same macro so the three interfaces
//! stay identical. Functions take `&mut Connection`, which both a pooled
//! connection and an open transaction dereference to.

use crate::db::statement::Statement;
use crate::db::types::RowValues;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, DataRecord, DataSet, DataTable, Parameter};
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::Either;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

// =============================================================================
// Common Helper Functions
// =============================================================================

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}

/// Pick output parameter values out of a returned row.
///
/// A column named after the parameter wins; otherwise the value at the
/// parameter's position among the outputs is used.
fn map_output_values(
    outputs: &[&Parameter],
    columns: &[ColumnMetadata],
    values: &[JsonValue],
) -> Vec<JsonValue> {
    outputs
        .iter()
        .enumerate()
        .map(|(position, parameter)| {
            let by_name = parameter.bare_name().and_then(|name| {
                columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            });
            by_name
                .or(Some(position))
                .and_then(|idx| values.get(idx))
                .cloned()
                .unwrap_or(JsonValue::Null)
        })
        .collect()
}

/// Accumulates streamed rows into result-set tables.
#[derive(Default)]
struct DataSetBuilder {
    data_set: DataSet,
    current: Option<DataTable>,
}

impl DataSetBuilder {
    fn push_row<R: RowValues>(&mut self, row: &R) {
        let table = self
            .current
            .get_or_insert_with(|| DataTable::new(row.column_metadata()));
        table.rows.push(row.values());
    }

    /// Close the current result set. Sets without rows are not kept.
    fn end_result(&mut self) {
        if let Some(table) = self.current.take() {
            self.data_set.tables.push(table);
        }
    }

    fn finish(mut self) -> DataSet {
        self.end_result();
        self.data_set
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.

macro_rules! backend_executor {
    ($module:ident, $name:literal, $db:ty, $conn:ty, $bind:path) => {
        pub mod $module {
            use super::*;
            use sqlx::Executor;

            pub const NAME: &str = $name;

            type Query<'q> =
                sqlx::query::Query<'q, $db, <$db as sqlx::Database>::Arguments<'q>>;

            fn prepare<'q>(statement: &'q Statement<'_>) -> Query<'q> {
                let mut query = sqlx::query(&*statement.sql);
                for value in &statement.binds {
                    query = $bind(query, *value);
                }
                query
            }

            /// Stream every result of the statement. Parameterless statements
            /// run unprepared so that multi-statement batches work.
            fn run<'e>(
                conn: &'e mut $conn,
                statement: &'e Statement<'_>,
            ) -> futures_util::stream::BoxStream<
                'e,
                Result<
                    Either<<$db as sqlx::Database>::QueryResult, <$db as sqlx::Database>::Row>,
                    sqlx::Error,
                >,
            > {
                if statement.is_unprepared() {
                    conn.fetch_many(&*statement.sql)
                } else {
                    conn.fetch_many(prepare(statement))
                }
            }

            pub async fn fill_data_set(
                conn: &mut $conn,
                statement: &Statement<'_>,
                query_timeout: Duration,
            ) -> DbResult<DataSet> {
                debug!(
                    backend = NAME,
                    sql = %statement.sql,
                    params = statement.binds.len(),
                    timeout_secs = query_timeout.as_secs(),
                    "Filling data set"
                );

                let work = async move {
                    let mut builder = DataSetBuilder::default();
                    let mut stream = run(conn, statement);
                    while let Some(item) = stream.try_next().await? {
                        match item {
                            Either::Left(_) => builder.end_result(),
                            Either::Right(row) => builder.push_row(&row),
                        }
                    }
                    Ok::<_, sqlx::Error>(builder.finish())
                };

                match timeout(query_timeout, work).await {
                    Ok(result) => result.map_err(DbError::from),
                    Err(_) => Err(timeout_error("data set fill", query_timeout)),
                }
            }

            pub async fn execute_scalar(
                conn: &mut $conn,
                statement: &Statement<'_>,
                query_timeout: Duration,
            ) -> DbResult<JsonValue> {
                debug!(
                    backend = NAME,
                    sql = %statement.sql,
                    params = statement.binds.len(),
                    timeout_secs = query_timeout.as_secs(),
                    "Executing scalar"
                );

                let work = async move {
                    let mut scalar = None;
                    let mut stream = run(conn, statement);
                    // The rest of the batch still has to run
                    while let Some(item) = stream.try_next().await? {
                        if let Either::Right(row) = item {
                            if scalar.is_none() {
                                let first = row.values().into_iter().next();
                                scalar = Some(first.unwrap_or(JsonValue::Null));
                            }
                        }
                    }
                    Ok::<_, sqlx::Error>(scalar.unwrap_or(JsonValue::Null))
                };

                match timeout(query_timeout, work).await {
                    Ok(result) => result.map_err(DbError::from),
                    Err(_) => Err(timeout_error("scalar execution", query_timeout)),
                }
            }

            pub async fn execute_non_query(
                conn: &mut $conn,
                statement: &Statement<'_>,
                query_timeout: Duration,
            ) -> DbResult<u64> {
                debug!(
                    backend = NAME,
                    sql = %statement.sql,
                    params = statement.binds.len(),
                    timeout_secs = query_timeout.as_secs(),
                    "Executing non-query"
                );

                let work = async move {
                    let mut rows_affected = 0u64;
                    let mut stream = run(conn, statement);
                    while let Some(item) = stream.try_next().await? {
                        if let Either::Left(result) = item {
                            rows_affected += result.rows_affected();
                        }
                    }
                    Ok::<_, sqlx::Error>(rows_affected)
                };

                match timeout(query_timeout, work).await {
                    Ok(result) => result.map_err(DbError::from),
                    Err(_) => Err(timeout_error("non-query execution", query_timeout)),
                }
            }

            /// Values of the OUTPUT and INPUT/OUTPUT parameters, in declaration
            /// order.
            pub async fn execute_output_values(
                conn: &mut $conn,
                statement: &Statement<'_>,
                query_timeout: Duration,
            ) -> DbResult<Vec<JsonValue>> {
                debug!(
                    backend = NAME,
                    sql = %statement.sql,
                    params = statement.binds.len(),
                    outputs = statement.outputs.len(),
                    timeout_secs = query_timeout.as_secs(),
                    "Executing for output values"
                );

                let work = async move {
                    // Procedure outputs travel through session variables
                    if let Some(select) = statement.session_select() {
                        for (sql, value) in statement.session_seeds() {
                            $bind(sqlx::query(sql.as_str()), value)
                                .execute(&mut *conn)
                                .await?;
                        }
                        run(&mut *conn, statement).try_collect::<Vec<_>>().await?;
                        let row = conn.fetch_optional(select.as_str()).await?;
                        let values = row.map(|r| r.values()).unwrap_or_default();
                        return Ok::<_, sqlx::Error>(
                            (0..statement.outputs.len())
                                .map(|i| values.get(i).cloned().unwrap_or(JsonValue::Null))
                                .collect(),
                        );
                    }

                    let mut first_row = None;
                    let mut stream = run(conn, statement);
                    while let Some(item) = stream.try_next().await? {
                        if let Either::Right(row) = item {
                            if first_row.is_none() {
                                first_row = Some((row.column_metadata(), row.values()));
                            }
                        }
                    }
                    let (columns, values) = first_row.unwrap_or_default();
                    Ok(map_output_values(&statement.outputs, &columns, &values))
                };

                match timeout(query_timeout, work).await {
                    Ok(result) => result.map_err(DbError::from),
                    Err(_) => Err(timeout_error("output value execution", query_timeout)),
                }
            }

            /// Send every row of every result set to `sender`.
            ///
            /// The timeout applies to each fetch. Stops early when the receiver
            /// is dropped. Returns `true` when a fetch timed out, leaving the
            /// connection unfit for reuse.
            pub async fn stream_rows(
                conn: &mut $conn,
                statement: &Statement<'_>,
                query_timeout: Duration,
                sender: &mpsc::Sender<DbResult<DataRecord>>,
            ) -> bool {
                debug!(
                    backend = NAME,
                    sql = %statement.sql,
                    params = statement.binds.len(),
                    timeout_secs = query_timeout.as_secs(),
                    "Opening reader"
                );

                let mut columns: Option<Arc<Vec<ColumnMetadata>>> = None;
                let mut stream = run(conn, statement);
                loop {
                    let item = match timeout(query_timeout, stream.try_next()).await {
                        Ok(Ok(Some(item))) => item,
                        Ok(Ok(None)) => break,
                        Ok(Err(e)) => {
                            let _ = sender.send(Err(DbError::from(e))).await;
                            break;
                        }
                        Err(_) => {
                            warn!(backend = NAME, "Reader fetch timed out");
                            let _ = sender
                                .send(Err(timeout_error("reader fetch", query_timeout)))
                                .await;
                            return true;
                        }
                    };

                    let row = match item {
                        Either::Left(_) => {
                            columns = None;
                            continue;
                        }
                        Either::Right(row) => row,
                    };
                    let shared = columns
                        .get_or_insert_with(|| Arc::new(row.column_metadata()))
                        .clone();
                    if sender.send(Ok(DataRecord::new(shared, row.values()))).await.is_err() {
                        debug!(backend = NAME, "Reader dropped before the end of the results");
                        break;
                    }
                }
                false
            }
        }
    };
}

backend_executor!(
    mysql,
    "mysql",
    sqlx::MySql,
    sqlx::MySqlConnection,
    crate::db::params::bind_mysql_param
);
backend_executor!(
    postgres,
    "postgres",
    sqlx::Postgres,
    sqlx::PgConnection,
    crate::db::params::bind_postgres_param
);
backend_executor!(
    sqlite,
    "sqlite",
    sqlx::Sqlite,
    sqlx::SqliteConnection,
    crate::db::params::bind_sqlite_param
);
