//! Integration tests for non-transactional operations on SQLite.

use futures_util::StreamExt;
use serde_json::json;
use tempfile::NamedTempFile;
use universal_data::db::DataAccess;
use universal_data::{Command, DbError};

/// Fresh database file with a small `items` table.
async fn setup(options: &str) -> (NamedTempFile, DataAccess) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let url = format!("sqlite:{}?mode=rwc{}", db_path, options);
    let access = DataAccess::new(&url).unwrap();

    access
        .execute_non_query(&Command::text(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL, data BLOB, active BOOLEAN)",
        ))
        .await
        .expect("CREATE TABLE should work");
    let inserted = access
        .execute_non_query(&Command::text(
            "INSERT INTO items (name, price, data, active) VALUES ('apple', 1.5, x'0102', 1), ('pear', 2.25, NULL, 0), ('plum', NULL, NULL, 1)",
        ))
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    (temp_file, access)
}

#[tokio::test]
async fn test_data_table_shapes_values() {
    let (_file, access) = setup("").await;

    let table = access
        .execute_data_table(&Command::text(
            "SELECT id, name, price, data, active FROM items ORDER BY id",
        ))
        .await
        .unwrap();

    assert_eq!(table.row_count(), 3);
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "price", "data", "active"]);
    assert_eq!(table.rows[0], vec![json!(1), json!("apple"), json!(1.5), json!("AQI="), json!(true)]);
    assert_eq!(table.value(1, "ACTIVE"), Some(&json!(false)));
    assert_eq!(table.value(2, "price"), Some(&serde_json::Value::Null));
    // NOT NULL is not visible from a result set
    assert!(table.columns.iter().all(|c| c.nullable));
}

#[tokio::test]
async fn test_data_set_keeps_every_result_set() {
    let (_file, access) = setup("").await;

    let data_set = access
        .execute_data_set(&Command::text(
            "SELECT name FROM items ORDER BY id; SELECT COUNT(*) AS n, MAX(price) AS top FROM items",
        ))
        .await
        .unwrap();

    assert_eq!(data_set.table_count(), 2);
    assert_eq!(data_set.tables[0].row_count(), 3);
    assert_eq!(data_set.tables[1].value(0, "n"), Some(&json!(3)));
    assert_eq!(data_set.tables[1].value(0, "top"), Some(&json!(2.25)));
}

#[tokio::test]
async fn test_data_table_without_rows_is_empty() {
    let (_file, access) = setup("").await;

    let table = access
        .execute_data_table(&Command::text("SELECT * FROM items WHERE id < 0"))
        .await
        .unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_named_parameters() {
    let (_file, access) = setup("").await;

    let cmd = Command::text("SELECT name FROM items WHERE price > @min AND active = @active")
        .named("@min", 1.0)
        .named("active", true);
    let table = access.execute_data_table(&cmd).await.unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.value(0, "name"), Some(&json!("apple")));
}

#[tokio::test]
async fn test_positional_parameters_and_scalar() {
    let (_file, access) = setup("").await;

    let count = access
        .execute_scalar(&Command::text("SELECT COUNT(*) FROM items WHERE name <> ?").param("plum"))
        .await
        .unwrap();
    assert_eq!(count, json!(2));

    let missing = access
        .execute_scalar(&Command::text("SELECT name FROM items WHERE id = ?").param(99))
        .await
        .unwrap();
    assert_eq!(missing, serde_json::Value::Null);
}

#[tokio::test]
async fn test_non_query_counts_affected_rows() {
    let (_file, access) = setup("").await;

    let updated = access
        .execute_non_query(&Command::text("UPDATE items SET price = 3 WHERE active = @a").named("a", true))
        .await
        .unwrap();
    assert_eq!(updated, 2);
}

#[tokio::test]
async fn test_output_values_from_returning() {
    let (_file, access) = setup("").await;

    let cmd = Command::text("INSERT INTO items (name, price) VALUES (@name, 9.5) RETURNING price, id")
        .named("name", "fig")
        .output("id")
        .output("price");
    let values = access.execute_output_values(&cmd).await.unwrap();
    assert_eq!(values, vec![json!(4), json!(9.5)]);

    let cmd = Command::text("INSERT INTO items (name) VALUES ('kiwi') RETURNING id").output("new_id");
    let value = access.execute_output_value(&cmd).await.unwrap();
    assert_eq!(value, json!(5));
}

#[tokio::test]
async fn test_output_values_without_output_parameters() {
    let (_file, access) = setup("").await;

    let values = access
        .execute_output_values(&Command::text("DELETE FROM items WHERE name = 'plum'"))
        .await
        .unwrap();
    assert!(values.is_empty());

    let err = access
        .execute_output_value(&Command::text("DELETE FROM items WHERE name = 'pear'"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NoOutputParameters { .. }));

    // Both commands ran
    let count = access
        .execute_scalar(&Command::text("SELECT COUNT(*) FROM items"))
        .await
        .unwrap();
    assert_eq!(count, json!(1));
}

#[tokio::test]
async fn test_table_direct() {
    let (_file, access) = setup("").await;

    let table = access.execute_data_table(&Command::table("items")).await.unwrap();
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.columns.len(), 5);

    let err = access
        .execute_data_table(&Command::table("items; DROP TABLE items"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_stored_procedure_unsupported() {
    let (_file, access) = setup("").await;

    let err = access
        .execute_non_query(&Command::procedure("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UnsupportedCommand { .. }));
}

#[tokio::test]
async fn test_database_error_is_reported() {
    let (_file, access) = setup("").await;

    let err = access
        .execute_scalar(&Command::text("SELECT * FROM no_such_table"))
        .await
        .unwrap_err();
    match err {
        DbError::Database { message, .. } => assert!(message.contains("no_such_table")),
        other => panic!("Expected database error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reader_streams_rows() {
    let (_file, access) = setup("").await;

    let mut reader = access
        .execute_reader(&Command::text("SELECT id, name FROM items ORDER BY id"))
        .await
        .unwrap();
    let first = reader.read().await.unwrap().unwrap();
    assert_eq!(first.get_by_name("NAME"), Some(&json!("apple")));
    assert_eq!(first.columns().len(), 2);

    let rest = reader.read_all().await.unwrap();
    assert_eq!(rest.len(), 2);
    assert!(reader.read().await.unwrap().is_none());
    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_reader_as_stream() {
    let (_file, access) = setup("").await;

    let reader = access
        .execute_reader(&Command::text("SELECT name FROM items WHERE price IS NOT NULL"))
        .await
        .unwrap();
    let names: Vec<_> = reader
        .map(|r| r.unwrap().into_values().remove(0))
        .collect()
        .await;
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn test_unpooled_operations_close_connections() {
    let (_file, access) = setup("&pooling=false").await;
    assert_eq!(access.pool().size(), 0);

    access
        .execute_scalar(&Command::text("SELECT 1"))
        .await
        .unwrap();
    assert_eq!(access.pool().size(), 0);

    // Failures release the connection too
    let _ = access
        .execute_scalar(&Command::text("SELECT broken FROM"))
        .await;
    assert_eq!(access.pool().size(), 0);

    let mut reader = access
        .execute_reader(&Command::text("SELECT id FROM items"))
        .await
        .unwrap();
    reader.read().await.unwrap();
    reader.close().await.unwrap();
    assert_eq!(access.pool().size(), 0);
}

#[tokio::test]
async fn test_reader_timeout_discards_connection() {
    let (_file, access) = setup("").await;

    // Long enough to outlast the one second timeout before the first row
    let slow = Command::text(
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 20000000) \
         SELECT MAX(x) FROM n",
    )
    .with_timeout(1);
    let mut reader = access.execute_reader(&slow).await.unwrap();
    let err = reader.read().await.unwrap_err();
    assert!(matches!(err, DbError::Timeout { .. }));
    reader.close().await.unwrap();

    // The timed out connection was closed instead of going back to the pool
    assert_eq!(access.pool().size(), 0);

    let value = access
        .execute_scalar(&Command::text("SELECT COUNT(*) FROM items"))
        .await
        .unwrap();
    assert_eq!(value, json!(3));
}

#[tokio::test]
async fn test_pooled_operations_reuse_connection() {
    let (_file, access) = setup("").await;

    for _ in 0..5 {
        access
            .execute_scalar(&Command::text("SELECT 1"))
            .await
            .unwrap();
    }
    // SQLite pools default to a single connection
    assert_eq!(access.pool().size(), 1);
    access.close().await;
    assert!(access.pool().is_closed());
}

#[tokio::test]
async fn test_ping() {
    let (_file, access) = setup("").await;
    access.ping().await.unwrap();
}
