//! Universal data access helpers.
//!
//! One set of operations (`execute_data_set`, `execute_data_table`,
//! `execute_reader`, `execute_scalar`, `execute_output_values`,
//! `execute_output_value`, `execute_non_query`) over PostgreSQL, MySQL and
//! SQLite, with or without a caller-managed transaction, async or blocking.
//!
//! ```ignore
//! use universal_data::{Command, PostgresHelper};
//!
//! let cmd = Command::text("select * from departamento where idgerencia = @id")
//!     .named("@id", 4);
//! let table = PostgresHelper::execute_data_table(url, &cmd).await?;
//! ```

pub mod blocking;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod helpers;
pub mod models;

pub use blocking::{BlockingDataAccess, BlockingReader, BlockingTransaction};
pub use db::{DataAccess, DataReader, DbTransaction, ReaderOpenError};
pub use error::{DbError, DbResult};
pub use helpers::{MySqlHelper, PostgresHelper, SqliteHelper};
pub use models::{
    Command, CommandType, DataRecord, DataSet, DataTable, DatabaseType, ParamValue, Parameter,
    ParameterDirection,
};
