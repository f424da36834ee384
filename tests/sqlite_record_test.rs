//! Integration tests for the gateway and generic records on SQLite.
//!
//! Tests verify that:
//! - Records round-trip through insert, fetch, update and delete
//! - Finders handle empty, scalar and multi-key lookups
//! - Schema problems surface as schema errors
//! - Reads degrade to empty results while writes fail loudly
//! - The select builders produce the expected rows

use record_gateway::config::GatewayConfig;
use record_gateway::db::{Gateway, assemble_filter};
use record_gateway::models::{Combinator, FetchOptions, Row};
use record_gateway::{DbError, PostOutcome, Record, index_result_set};
use serde_json::{Value as JsonValue, json};
use tempfile::NamedTempFile;

/// Create a SQLite test database with a `users` table.
async fn setup_db() -> Gateway {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let config = GatewayConfig::new("sqlite:{{path}}").with_var("path", db_path);
    let gateway = Gateway::connect(&config).await.unwrap();

    gateway
        .execute_sql(
            "CREATE TABLE users (ID INTEGER PRIMARY KEY, name TEXT, email TEXT UNIQUE)",
            &[],
        )
        .await
        .unwrap();

    gateway
}

async fn seed_users(gateway: &Gateway) {
    for (name, email) in [("Ana", "a@x.com"), ("Bo", "b@x.com"), ("Cy", "c@x.com")] {
        gateway
            .execute_sql(
                "INSERT INTO users(name, email) VALUES(?, ?)",
                &[json!(name), json!(email)],
            )
            .await
            .unwrap();
    }
}

fn row(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

async fn count_users(gateway: &Gateway) -> JsonValue {
    let rows = gateway
        .try_get_sql_array("SELECT COUNT(*) AS n FROM users", &[])
        .await
        .unwrap();
    rows[0]["n"].clone()
}

// ==================== Records ====================

#[tokio::test]
async fn test_new_record_has_every_column_null() {
    let gateway = setup_db().await;
    let record = Record::new(&gateway, "users").await.unwrap();

    assert_eq!(
        record.data(),
        &row(json!({"ID": null, "name": null, "email": null}))
    );
    assert_eq!(record.primary_key(), "ID");
    assert!(record.is_new());
}

#[tokio::test]
async fn test_users_example_round_trip() {
    let gateway = setup_db().await;

    let mut record = Record::new(&gateway, "users").await.unwrap();
    record.set("name", "Ana").set("email", "a@x.com");
    let outcome = record.post().await.unwrap();

    assert_eq!(outcome, PostOutcome::Inserted(json!(1)));
    assert_eq!(record.get("ID"), Some(&json!(1)));
    assert!(!record.is_new());

    let fetched = Record::fetch_by_id(&gateway, "users", 1)
        .await
        .unwrap()
        .expect("row should exist");
    assert_eq!(
        fetched.data(),
        &row(json!({"ID": 1, "name": "Ana", "email": "a@x.com"}))
    );
}

#[tokio::test]
async fn test_update_then_fetch_reflects_changes() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let mut record = Record::fetch_by_id(&gateway, "users", 2)
        .await
        .unwrap()
        .unwrap();
    record.set("email", "bo@example.com");

    let outcome = record.post().await.unwrap();
    assert_eq!(outcome, PostOutcome::Updated(1));

    let fetched = Record::fetch_by_id(&gateway, "users", 2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.get("email"), Some(&json!("bo@example.com")));
    assert_eq!(fetched.get("name"), Some(&json!("Bo")));
}

#[tokio::test]
async fn test_delete_then_fetch_returns_none() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let mut record = Record::fetch_by_id(&gateway, "users", 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.delete().await.unwrap(), 1);

    // the record still holds the deleted row
    assert_eq!(record.get("name"), Some(&json!("Cy")));

    let fetched = Record::fetch_by_id(&gateway, "users", 3).await.unwrap();
    assert!(fetched.is_none());
    assert_eq!(count_users(&gateway).await, json!(2));
}

#[tokio::test]
async fn test_fetch_by_other_field() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let record = Record::fetch(&gateway, "users", "b@x.com", "email")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.get("ID"), Some(&json!(2)));

    let missing = Record::fetch(&gateway, "users", "nobody@x.com", "email")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_insert_strips_unknown_fields() {
    let gateway = setup_db().await;

    let data = row(json!({"name": "Dee", "nickname": "D", "email": "d@x.com"}));
    let mut record = Record::with_data(&gateway, "users", data).await.unwrap();
    let key = record.insert().await.unwrap();

    assert_eq!(key, json!(1));
    assert!(!record.contains("nickname"));
    assert_eq!(
        record.data(),
        &row(json!({"name": "Dee", "email": "d@x.com", "ID": 1}))
    );
}

#[tokio::test]
async fn test_insert_keeps_caller_supplied_key() {
    let gateway = setup_db().await;

    let mut record = Record::new(&gateway, "users").await.unwrap();
    record.set("ID", 42).set("name", "Eve");
    assert_eq!(record.insert().await.unwrap(), json!(42));

    let fetched = Record::fetch_by_id(&gateway, "users", 42)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.get("name"), Some(&json!("Eve")));
}

#[tokio::test]
async fn test_zero_key_is_not_treated_as_new() {
    let gateway = setup_db().await;

    let mut record = Record::new(&gateway, "users").await.unwrap();
    record.set("ID", 0).set("name", "Zed");

    // no row has ID 0, so the update touches nothing
    assert_eq!(record.post().await.unwrap(), PostOutcome::Updated(0));
    assert_eq!(count_users(&gateway).await, json!(0));
}

#[tokio::test]
async fn test_failed_insert_rolls_back() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let mut record = Record::new(&gateway, "users").await.unwrap();
    record.set("name", "Dup").set("email", "a@x.com");

    let err = record.insert().await.unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));
    assert!(record.is_new());
    assert_eq!(count_users(&gateway).await, json!(3));
}

// ==================== Finders ====================

#[tokio::test]
async fn test_fetch_list_with_no_ids_is_empty() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let records = Record::fetch_list(&gateway, "users", Vec::<i64>::new(), "ID")
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_fetch_list_is_ordered_by_field() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let records = Record::fetch_list(&gateway, "users", vec![3i64, 1, 99], "ID")
        .await
        .unwrap();
    let names: Vec<&JsonValue> = records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec![&json!("Ana"), &json!("Cy")]);
}

#[tokio::test]
async fn test_fetch_list_accepts_scalar() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let records = Record::fetch_list(&gateway, "users", 2i64, "ID").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("name"), Some(&json!("Bo")));
}

#[tokio::test]
async fn test_index_result_set_over_query_rows() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let rows = gateway
        .try_get_sql_array("SELECT ID, name FROM users", &[])
        .await
        .unwrap();
    let index = index_result_set(rows, "name");

    assert_eq!(index.len(), 3);
    assert_eq!(index["Bo"]["ID"], json!(2));
}

// ==================== Schema errors ====================

#[tokio::test]
async fn test_unknown_table_is_schema_error() {
    let gateway = setup_db().await;

    let err = Record::new(&gateway, "missing").await.unwrap_err();
    assert!(matches!(err, DbError::Schema { .. }));

    let meta = gateway.fetch_table_meta("missing").await.unwrap();
    assert!(meta.is_empty());
}

#[tokio::test]
async fn test_composite_primary_key_is_schema_error() {
    let gateway = setup_db().await;
    gateway
        .execute_sql(
            "CREATE TABLE memberships (user_id INTEGER, group_id INTEGER, PRIMARY KEY (user_id, group_id))",
            &[],
        )
        .await
        .unwrap();

    let err = gateway.fetch_table_pk("memberships").await.unwrap_err();
    assert!(err.to_string().contains("user_id, group_id"));
    assert!(matches!(
        Record::new(&gateway, "memberships").await,
        Err(DbError::Schema { .. })
    ));
}

#[tokio::test]
async fn test_table_without_primary_key_is_schema_error() {
    let gateway = setup_db().await;
    gateway
        .execute_sql("CREATE TABLE audit_log (message TEXT)", &[])
        .await
        .unwrap();

    let err = gateway.fetch_table_pk("audit_log").await.unwrap_err();
    assert!(matches!(err, DbError::Schema { .. }));
}

#[tokio::test]
async fn test_table_meta_and_pk() {
    let gateway = setup_db().await;

    let meta = gateway.fetch_table_meta("users").await.unwrap();
    let columns: Vec<&str> = meta.column_names().collect();
    assert_eq!(columns, vec!["ID", "name", "email"]);
    assert_eq!(meta.data_type("ID"), Some("INTEGER"));

    // primary key lookup ignores case of the table name
    assert_eq!(gateway.fetch_table_pk("USERS").await.unwrap(), "ID");

    let qualified = gateway.fetch_table_meta("main.users").await.unwrap();
    assert_eq!(qualified, meta);
}

// ==================== Reads and writes ====================

#[tokio::test]
async fn test_failed_read_returns_no_rows() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let rows = gateway.get_sql_array("SELECT * FROM nowhere", &[]).await;
    assert!(rows.is_empty());

    let err = gateway
        .try_get_sql_array("SELECT * FROM nowhere", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));
}

#[tokio::test]
async fn test_failed_write_is_an_error() {
    let gateway = setup_db().await;

    let err = gateway
        .execute_sql("UPDATE nowhere SET x = ?", &[json!(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));
}

#[tokio::test]
async fn test_execute_sql_reports_rows_affected() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let affected = gateway
        .execute_sql("DELETE FROM users WHERE ID > ?", &[json!(1)])
        .await
        .unwrap();
    assert_eq!(affected, 2);
}

// ==================== Select builders ====================

#[tokio::test]
async fn test_fetch_simple_data() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let options = FetchOptions::from_value(json!({
        "filter": [{"query": "name = ?", "param": "Ana"}],
        "orderby": ["ID"],
        "limit": 10,
        "andOr": "AND",
        "fields": "ID, name"
    }))
    .unwrap();

    let rows = gateway.fetch_simple_data("users", &options).await.unwrap();
    assert_eq!(rows, vec![row(json!({"ID": 1, "name": "Ana"}))]);
}

#[tokio::test]
async fn test_fetch_simple_data_defaults_select_everything() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let rows = gateway
        .fetch_simple_data("users", &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].len(), 3);
}

#[tokio::test]
async fn test_fetch_simple_data_built_in_code() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let options = FetchOptions::default()
        .with_filters(assemble_filter(
            &row(json!({"name": "Ana", "email": "c@x.com"})),
            "=",
        ))
        .combinator(Combinator::Or)
        .order_by("ID DESC")
        .limit(5)
        .fields("name");

    let rows = gateway.fetch_simple_data("users", &options).await.unwrap();
    assert_eq!(rows, vec![row(json!({"name": "Cy"})), row(json!({"name": "Ana"}))]);
}

#[tokio::test]
async fn test_fetch_table_data_inverted() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    // `? > ID` with 3 bound: ID 1 and 2
    let rows = gateway
        .fetch_table_data(
            "users",
            "ID",
            3i64,
            ">",
            &["ID".to_string()],
            true,
            None,
            "ID",
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![row(json!({"ID": 1})), row(json!({"ID": 2}))]);
}

#[tokio::test]
async fn test_fetch_table_data_with_limit_and_order() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let rows = gateway
        .fetch_table_data(
            "users",
            "",
            JsonValue::Null,
            "=",
            &["name DESC".to_string()],
            false,
            Some(2),
            "name",
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![row(json!({"name": "Cy"})), row(json!({"name": "Bo"}))]);
}

#[tokio::test]
async fn test_assembled_containing_filter() {
    let gateway = setup_db().await;
    seed_users(&gateway).await;

    let filters = assemble_filter(&row(json!({"email": "b@"})), "CONTAINING");
    let rows = gateway
        .fetch_table_data_f("users", &filters, &[], None, Combinator::And, "name")
        .await
        .unwrap();
    assert_eq!(rows, vec![row(json!({"name": "Bo"}))]);
}

#[tokio::test]
async fn test_builder_rejects_bad_table_name() {
    let gateway = setup_db().await;

    let err = gateway
        .fetch_table_data_f("users; DROP TABLE users", &[], &[], None, Combinator::And, "*")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_get_instance_is_shared() {
    let config = GatewayConfig::new("sqlite::memory:");
    let first = Gateway::get_instance(&config).await.unwrap();
    first
        .execute_sql("CREATE TABLE IF NOT EXISTS shared (ID INTEGER PRIMARY KEY)", &[])
        .await
        .unwrap();

    // a different config is ignored once the instance exists
    let second = Gateway::get_instance(&GatewayConfig::new("sqlite:/nonexistent/dir/x.db"))
        .await
        .unwrap();
    assert_eq!(second.fetch_table_pk("shared").await.unwrap(), "ID");
    assert!(Gateway::instance().is_some());
}
