//! Database-agnostic type mappings.
//!
//! Rows from every driver are shaped into JSON values so that `DataTable`,
//! `DataRecord` and scalar results look the same whatever the provider.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQLite is the exception: its declared column types are advisory, so the
//! SQLite decoder classifies each value by its runtime storage class.

use crate::models::{ColumnMetadata, DatabaseType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "interval" {
        return TypeCategory::Unknown;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    match lower.as_str() {
        "timestamptz" => return TypeCategory::TimestampTz,
        // MySQL TIMESTAMP is stored in UTC
        "timestamp" if db == DatabaseType::MySQL => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        _ => {}
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Value Helpers
// =============================================================================

/// Encode binary data as a base64 JSON string.
pub fn binary_to_json(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// `Some(value)` when the column decodes as `T` (NULL becomes `JsonValue::Null`).
fn decode_as<'r, R, T>(row: &'r R, idx: usize, to_json: impl FnOnce(T) -> JsonValue) -> Option<JsonValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Some(to_json(v)),
        Ok(None) => Some(JsonValue::Null),
        Err(_) => None,
    }
}

fn string_json(v: String) -> JsonValue {
    JsonValue::String(v)
}

// =============================================================================
// Row Shaping Trait
// =============================================================================

/// Trait for shaping database rows into column metadata and JSON values.
pub trait RowValues {
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
    fn values(&self) -> Vec<JsonValue>;
}

impl RowValues for MySqlRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        declared_metadata(self)
    }

    fn values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl RowValues for PgRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        declared_metadata(self)
    }

    fn values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl RowValues for SqliteRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = col.type_info();
                let type_name = if declared.is_null() {
                    sqlite::runtime_type_name(self, idx)
                } else {
                    declared.name().to_string()
                };
                ColumnMetadata::new(col.name(), type_name, true)
            })
            .collect()
    }

    fn values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                sqlite::decode_column(self, idx, declared)
            })
            .collect()
    }
}

/// Rows carry no NOT NULL information, so every column is reported nullable.
fn declared_metadata<R: Row>(row: &R) -> Vec<ColumnMetadata> {
    row.columns()
        .iter()
        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name(), true))
        .collect()
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        let value = match category {
            TypeCategory::Decimal => decode_as(row, idx, |v: Decimal| JsonValue::String(v.to_string())),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_as(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_as(row, idx, float_to_json)
                .or_else(|| decode_as(row, idx, |v: f32| float_to_json(v as f64))),
            TypeCategory::Binary => decode_as(row, idx, |v: Vec<u8>| binary_to_json(&v)),
            TypeCategory::Json => decode_as(row, idx, |v: JsonValue| v),
            TypeCategory::TimestampTz => {
                decode_as(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()))
            }
            TypeCategory::Timestamp => {
                decode_as(row, idx, |v: NaiveDateTime| JsonValue::String(v.to_string()))
            }
            TypeCategory::Date => decode_as(row, idx, |v: NaiveDate| JsonValue::String(v.to_string())),
            TypeCategory::Time => decode_as(row, idx, |v: NaiveTime| JsonValue::String(v.to_string())),
            _ => None,
        };
        value
            .or_else(|| decode_as(row, idx, string_json))
            .or_else(|| decode_as(row, idx, |v: Vec<u8>| binary_to_json(&v)))
            .unwrap_or_else(|| {
                tracing::warn!(column = idx, ?category, "Unsupported MySQL column type");
                JsonValue::Null
            })
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        decode_as(row, idx, |v: i8| JsonValue::from(v))
            .or_else(|| decode_as(row, idx, |v: i16| JsonValue::from(v)))
            .or_else(|| decode_as(row, idx, |v: i32| JsonValue::from(v)))
            .or_else(|| decode_as(row, idx, |v: i64| JsonValue::from(v)))
            .or_else(|| decode_as(row, idx, |v: u8| JsonValue::from(v)))
            .or_else(|| decode_as(row, idx, |v: u16| JsonValue::from(v)))
            .or_else(|| decode_as(row, idx, |v: u32| JsonValue::from(v)))
            .or_else(|| decode_as(row, idx, |v: u64| JsonValue::from(v)))
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        let value = match category {
            TypeCategory::Decimal => decode_as(row, idx, |v: Decimal| JsonValue::String(v.to_string())),
            TypeCategory::Integer => decode_as(row, idx, |v: i16| JsonValue::from(v))
                .or_else(|| decode_as(row, idx, |v: i32| JsonValue::from(v)))
                .or_else(|| decode_as(row, idx, |v: i64| JsonValue::from(v))),
            TypeCategory::Boolean => decode_as(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_as(row, idx, float_to_json)
                .or_else(|| decode_as(row, idx, |v: f32| float_to_json(v as f64))),
            TypeCategory::Binary => decode_as(row, idx, |v: Vec<u8>| binary_to_json(&v)),
            TypeCategory::Json => decode_as(row, idx, |v: JsonValue| v),
            TypeCategory::Uuid => {
                decode_as(row, idx, |v: uuid::Uuid| JsonValue::String(v.to_string()))
            }
            TypeCategory::TimestampTz => {
                decode_as(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()))
            }
            TypeCategory::Timestamp => {
                decode_as(row, idx, |v: NaiveDateTime| JsonValue::String(v.to_string()))
            }
            TypeCategory::Date => decode_as(row, idx, |v: NaiveDate| JsonValue::String(v.to_string())),
            TypeCategory::Time => decode_as(row, idx, |v: NaiveTime| JsonValue::String(v.to_string())),
            _ => None,
        };
        value
            .or_else(|| decode_as(row, idx, string_json))
            .unwrap_or_else(|| {
                tracing::warn!(column = idx, ?category, "Unsupported PostgreSQL column type");
                JsonValue::Null
            })
    }
}

mod sqlite {
    use super::*;

    /// Storage class of the value in this row ("INTEGER", "REAL", "TEXT", ...).
    pub fn runtime_type_name(row: &SqliteRow, idx: usize) -> String {
        row.try_get_raw(idx)
            .map(|raw| raw.type_info().name().to_string())
            .unwrap_or_else(|_| "NULL".to_string())
    }

    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        let storage = runtime_type_name(row, idx);
        if storage == "NULL" {
            return JsonValue::Null;
        }

        let value = match categorize_type(&storage, DatabaseType::SQLite) {
            TypeCategory::Integer if declared == TypeCategory::Boolean => {
                decode_as(row, idx, JsonValue::Bool)
            }
            TypeCategory::Integer => decode_as(row, idx, |v: i64| JsonValue::from(v)),
            TypeCategory::Float => decode_as(row, idx, float_to_json),
            TypeCategory::Binary => decode_as(row, idx, |v: Vec<u8>| binary_to_json(&v)),
            _ => decode_as(row, idx, string_json),
        };
        value.unwrap_or_else(|| {
            tracing::warn!(column = idx, storage = %storage, "Unsupported SQLite value");
            JsonValue::Null
        })
    }
}
