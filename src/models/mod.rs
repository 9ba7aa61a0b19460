//! Data models.
//!
//! This module re-exports all model types used throughout the crate.

pub mod command;
pub mod connection;
pub mod data;

// Re-export commonly used types
pub use command::{
    Command, CommandType, DEFAULT_COMMAND_TIMEOUT_SECS, MAX_COMMAND_TIMEOUT_SECS, ParamValue,
    Parameter, ParameterDirection,
};
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use data::{ColumnMetadata, DataRecord, DataSet, DataTable};
