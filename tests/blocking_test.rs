//! Integration tests for the synchronous API.

use serde_json::json;
use tempfile::NamedTempFile;
use universal_data::{BlockingDataAccess, Command, DbError};

fn setup() -> (NamedTempFile, BlockingDataAccess) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let access = BlockingDataAccess::new(&format!("sqlite:{}?mode=rwc", db_path)).unwrap();

    access
        .execute_non_query(&Command::text(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, meta TEXT)",
        ))
        .unwrap();
    access
        .execute_non_query(&Command::text(
            "INSERT INTO notes (body, meta) VALUES ('first', '{\"tag\": \"x\"}'), ('second', NULL)",
        ))
        .unwrap();

    (temp_file, access)
}

#[test]
fn test_blocking_operations() {
    let (_file, access) = setup();
    access.ping().unwrap();

    let table = access
        .execute_data_table(&Command::text("SELECT body, meta FROM notes ORDER BY id"))
        .unwrap();
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.value(0, "meta"), Some(&json!("{\"tag\": \"x\"}")));
    assert_eq!(table.value(1, "meta"), Some(&serde_json::Value::Null));

    let set = access
        .execute_data_set(&Command::text("SELECT 1; SELECT 2; SELECT 3"))
        .unwrap();
    assert_eq!(set.table_count(), 3);

    let count = access
        .execute_scalar(&Command::text("SELECT COUNT(*) FROM notes WHERE body LIKE @p").named("p", "s%"))
        .unwrap();
    assert_eq!(count, json!(1));

    let id = access
        .execute_output_value(
            &Command::text("INSERT INTO notes (body) VALUES ('third') RETURNING id").output("id"),
        )
        .unwrap();
    assert_eq!(id, json!(3));

    let values = access
        .execute_output_values(&Command::text("SELECT 1"))
        .unwrap();
    assert!(values.is_empty());
    let err = access
        .execute_output_value(&Command::text("SELECT 1"))
        .unwrap_err();
    assert!(matches!(err, DbError::NoOutputParameters { .. }));

    access.close();
}

#[test]
fn test_blocking_reader_iterates() {
    let (_file, access) = setup();

    let reader = access
        .execute_reader(&Command::text("SELECT body FROM notes ORDER BY id"))
        .unwrap();
    let bodies: Vec<_> = reader
        .map(|r| r.unwrap().get(0).cloned().unwrap())
        .collect();
    assert_eq!(bodies, vec![json!("first"), json!("second")]);

    let mut reader = access
        .execute_reader(&Command::text("SELECT body FROM notes"))
        .unwrap();
    assert!(reader.next().is_some());
    reader.close().unwrap();
}

#[test]
fn test_blocking_transaction_commit_and_rollback() {
    let (_file, access) = setup();

    let mut tx = access.begin().unwrap();
    tx.execute_non_query(&Command::text("DELETE FROM notes")).unwrap();
    tx.rollback().unwrap();
    assert_eq!(
        access.execute_scalar(&Command::text("SELECT COUNT(*) FROM notes")).unwrap(),
        json!(2)
    );

    let mut tx = access.begin().unwrap();
    tx.execute_non_query(&Command::text("UPDATE notes SET body = 'changed' WHERE id = 1"))
        .unwrap();
    let mut reader = tx
        .execute_reader(&Command::text("SELECT body FROM notes WHERE id = 1"))
        .unwrap();
    let record = reader.next().unwrap().unwrap();
    assert_eq!(record.get_by_name("body"), Some(&json!("changed")));
    let tx = reader.close().unwrap();

    let rejected = tx.execute_reader(&Command::text("")).unwrap_err();
    assert!(matches!(rejected.error, DbError::InvalidInput { .. }));
    let tx = rejected.transaction;
    tx.commit().unwrap();

    assert_eq!(
        access
            .execute_scalar(&Command::text("SELECT body FROM notes WHERE id = 1"))
            .unwrap(),
        json!("changed")
    );
}
