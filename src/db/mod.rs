//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Lazy connection pools per connection string
//! - Statement building and parameter binding
//! - Command execution
//! - Type mappings
//! - Database dispatch macros for reducing code duplication
//! - Caller-managed transactions and streaming readers

#[macro_use]
pub mod macros;
pub mod access;
pub mod executor;
pub mod params;
pub mod pool;
pub mod reader;
pub mod statement;
pub mod transaction;
pub mod types;

pub use access::DataAccess;
pub use pool::{DbPool, PooledConnection, PooledTransaction};
pub use reader::DataReader;
pub use statement::Statement;
pub use transaction::{DbTransaction, ReaderOpenError};
