//! Per-provider static helpers.
//!
//! Each helper is a stateless facade over [`DataAccess`] for one provider.
//! Non-transactional calls take a connection string, open a single
//! connection for the call and close it afterwards. The `_in` variants run
//! on a caller-owned [`DbTransaction`] and leave its connection open.

use crate::db::{DataAccess, DataReader, DbTransaction, ReaderOpenError};
use crate::error::{DbError, DbResult};
use crate::models::{Command, ConnectionConfig, DataSet, DataTable, DatabaseType};
use serde_json::Value as JsonValue;

/// Parse `connection_string` for a one-call, unpooled [`DataAccess`].
fn single_use_access(connection_string: &str, expected: DatabaseType) -> DbResult<DataAccess> {
    let mut config = ConnectionConfig::parse(connection_string)?;
    if config.db_type != expected {
        return Err(DbError::invalid_input(format!(
            "Expected a {} connection string, got {}",
            expected, config.db_type
        )));
    }
    config.pool_options.max_connections = Some(1);
    config.pool_options.min_connections = Some(0);
    config.pool_options.pooling = Some(false);
    DataAccess::from_config(config)
}

fn check_transaction(tx: &DbTransaction, expected: DatabaseType) -> DbResult<()> {
    if tx.db_type() == expected {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Expected a {} transaction, got {}",
            expected,
            tx.db_type()
        )))
    }
}

macro_rules! provider_helper {
    ($(#[$meta:meta])* $name:ident, $db_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $name {
            pub const DATABASE_TYPE: DatabaseType = $db_type;

            /// Every row-producing result set of the command.
            pub async fn execute_data_set(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<DataSet> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                let result = access.execute_data_set(command).await;
                access.close().await;
                result
            }

            pub async fn execute_data_set_in(
                tx: &mut DbTransaction,
                command: &Command,
            ) -> DbResult<DataSet> {
                check_transaction(tx, Self::DATABASE_TYPE)?;
                tx.execute_data_set(command).await
            }

            /// First result set of the command (empty when there is none).
            pub async fn execute_data_table(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<DataTable> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                let result = access.execute_data_table(command).await;
                access.close().await;
                result
            }

            pub async fn execute_data_table_in(
                tx: &mut DbTransaction,
                command: &Command,
            ) -> DbResult<DataTable> {
                check_transaction(tx, Self::DATABASE_TYPE)?;
                tx.execute_data_table(command).await
            }

            /// Stream the rows of the command. The connection is closed when
            /// the reader finishes.
            pub async fn execute_reader(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<DataReader> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                access.execute_reader(command).await
            }

            /// Stream the rows of the command inside `tx`. A rejected call
            /// hands `tx` back inside the error.
            pub async fn execute_reader_in(
                tx: DbTransaction,
                command: &Command,
            ) -> Result<DataReader<DbTransaction>, ReaderOpenError> {
                if let Err(error) = check_transaction(&tx, Self::DATABASE_TYPE) {
                    return Err(ReaderOpenError::new(error, tx));
                }
                tx.execute_reader(command).await
            }

            /// First column of the first row, `Null` when no row is returned.
            pub async fn execute_scalar(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<JsonValue> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                let result = access.execute_scalar(command).await;
                access.close().await;
                result
            }

            pub async fn execute_scalar_in(
                tx: &mut DbTransaction,
                command: &Command,
            ) -> DbResult<JsonValue> {
                check_transaction(tx, Self::DATABASE_TYPE)?;
                tx.execute_scalar(command).await
            }

            /// Values of every OUTPUT and INPUT/OUTPUT parameter.
            pub async fn execute_output_values(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<Vec<JsonValue>> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                let result = access.execute_output_values(command).await;
                access.close().await;
                result
            }

            pub async fn execute_output_values_in(
                tx: &mut DbTransaction,
                command: &Command,
            ) -> DbResult<Vec<JsonValue>> {
                check_transaction(tx, Self::DATABASE_TYPE)?;
                tx.execute_output_values(command).await
            }

            /// Value of the first OUTPUT or INPUT/OUTPUT parameter.
            pub async fn execute_output_value(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<JsonValue> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                let result = access.execute_output_value(command).await;
                access.close().await;
                result
            }

            pub async fn execute_output_value_in(
                tx: &mut DbTransaction,
                command: &Command,
            ) -> DbResult<JsonValue> {
                check_transaction(tx, Self::DATABASE_TYPE)?;
                tx.execute_output_value(command).await
            }

            /// Rows affected by the command.
            pub async fn execute_non_query(
                connection_string: &str,
                command: &Command,
            ) -> DbResult<u64> {
                let access = single_use_access(connection_string, Self::DATABASE_TYPE)?;
                let result = access.execute_non_query(command).await;
                access.close().await;
                result
            }

            pub async fn execute_non_query_in(
                tx: &mut DbTransaction,
                command: &Command,
            ) -> DbResult<u64> {
                check_transaction(tx, Self::DATABASE_TYPE)?;
                tx.execute_non_query(command).await
            }

            /// Open a connection and start a transaction on it. The connection
            /// is closed on commit or rollback.
            pub async fn begin(connection_string: &str) -> DbResult<DbTransaction> {
                single_use_access(connection_string, Self::DATABASE_TYPE)?
                    .begin_owned()
                    .await
            }
        }
    };
}

provider_helper!(
    /// Helper for PostgreSQL (`postgres://` / `postgresql://`).
    PostgresHelper,
    DatabaseType::PostgreSQL
);

provider_helper!(
    /// Helper for MySQL and MariaDB (`mysql://` / `mariadb://`).
    MySqlHelper,
    DatabaseType::MySQL
);

provider_helper!(
    /// Helper for SQLite files (`sqlite:`). Stored procedures are not
    /// available on this provider.
    SqliteHelper,
    DatabaseType::SQLite
);
