//! Schema introspection module.
//!
//! Two catalog lookups per backend: the ordered `(column_name, data_type)`
//! pairs of a table, and the table's primary-key column(s). Table names may be
//! schema-qualified (`schema.table`); otherwise the connection's current
//! schema (PostgreSQL), database (MySQL) or `main` (SQLite) is searched.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Both lookups go through the regular executor, so catalog
//! rows are decoded like any other result.

use crate::db::executor;
use crate::db::pool::DbPool;
use crate::db::sql::validate_identifier;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, Row, TableMeta};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Schema inspector for catalog introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Column name to data type, in ordinal order.
    ///
    /// An unknown table yields an empty mapping. The table name is matched
    /// exactly as the catalog stores it.
    pub async fn table_meta(pool: &DbPool, table: &str) -> DbResult<TableMeta> {
        let (sql, params) = Self::lookup(pool.db_type(), table, Lookup::Columns)?;
        let rows = executor::fetch_rows(pool, sql, &params).await?;

        let meta = rows
            .iter()
            .map(|row| {
                Ok((
                    text_column(row, "column_name", table)?,
                    text_column(row, "data_type", table)?,
                ))
            })
            .collect::<DbResult<TableMeta>>()?;

        debug!(table = %table, columns = meta.len(), "Fetched table metadata");
        Ok(meta)
    }

    /// Primary-key column names in key order, table name matched case-insensitively.
    pub async fn primary_key_columns(pool: &DbPool, table: &str) -> DbResult<Vec<String>> {
        let (sql, params) = Self::lookup(pool.db_type(), table, Lookup::PrimaryKey)?;
        let rows = executor::fetch_rows(pool, sql, &params).await?;

        let columns = rows
            .iter()
            .map(|row| text_column(row, "column_name", table))
            .collect::<DbResult<Vec<_>>>()?;

        debug!(table = %table, primary_key = ?columns, "Fetched primary key");
        Ok(columns)
    }

    fn lookup(
        db_type: DatabaseType,
        table: &str,
        lookup: Lookup,
    ) -> DbResult<(&'static str, Vec<QueryParam>)> {
        validate_identifier(table)?;
        let (schema, name) = split_qualified(table);
        let name = QueryParam::String(name.to_string());
        let schema = schema
            .map(|s| QueryParam::String(s.to_string()))
            .unwrap_or(QueryParam::Null);

        let query = match (db_type, lookup) {
            (DatabaseType::MySQL, Lookup::Columns) => (queries::mysql::COLUMNS, vec![name, schema]),
            (DatabaseType::MySQL, Lookup::PrimaryKey) => {
                (queries::mysql::PRIMARY_KEY, vec![name, schema])
            }
            (DatabaseType::PostgreSQL, Lookup::Columns) => {
                (queries::postgres::COLUMNS, vec![name, schema])
            }
            (DatabaseType::PostgreSQL, Lookup::PrimaryKey) => {
                (queries::postgres::PRIMARY_KEY, vec![name, schema])
            }
            (DatabaseType::SQLite, Lookup::Columns) => match schema {
                QueryParam::Null => (queries::sqlite::COLUMNS, vec![name]),
                schema => (queries::sqlite::COLUMNS_IN_SCHEMA, vec![name, schema]),
            },
            (DatabaseType::SQLite, Lookup::PrimaryKey) => match schema {
                QueryParam::Null => (queries::sqlite::PRIMARY_KEY, vec![name]),
                schema => (queries::sqlite::PRIMARY_KEY_IN_SCHEMA, vec![name, schema]),
            },
        };
        Ok(query)
    }
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Columns,
    PrimaryKey,
}

/// Split `schema.table` into its parts.
fn split_qualified(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

fn text_column(row: &Row, column: &str, table: &str) -> DbResult<String> {
    match row.get(column) {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        // SQLite reports untyped columns with an empty type
        Some(JsonValue::Null) if column == "data_type" => Ok(String::new()),
        other => Err(DbError::schema(
            format!("Catalog returned {:?} for '{}'", other, column),
            table,
        )),
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Centralized SQL queries for schema introspection. Each database has its own
// submodule with queries adapted to its specific system catalogs. Parameters
// are the bare table name, then the schema name or NULL.

mod queries {
    pub mod mysql {
        pub const COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(DATA_TYPE USING utf8mb4) AS data_type
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;

        pub const PRIMARY_KEY: &str = r#"
        SELECT CONVERT(COLUMN_NAME USING utf8mb4) AS column_name
        FROM information_schema.COLUMNS
        WHERE UPPER(TABLE_NAME) = UPPER(?)
        AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND COLUMN_KEY = 'PRI'
        ORDER BY ORDINAL_POSITION
        "#;
    }

    pub mod postgres {
        pub const COLUMNS: &str = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type
        FROM information_schema.columns
        WHERE table_name::text = ?
        AND table_schema::text = COALESCE(?, current_schema()::text)
        ORDER BY ordinal_position
        "#;

        pub const PRIMARY_KEY: &str = r#"
        SELECT kcu.column_name::text AS column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
        AND UPPER(tc.table_name::text) = UPPER(?)
        AND tc.table_schema::text = COALESCE(?, current_schema()::text)
        ORDER BY kcu.ordinal_position
        "#;
    }

    pub mod sqlite {
        pub const COLUMNS: &str =
            "SELECT name AS column_name, type AS data_type FROM pragma_table_info(?) ORDER BY cid";

        pub const COLUMNS_IN_SCHEMA: &str = "SELECT name AS column_name, type AS data_type \
             FROM pragma_table_info(?, ?) ORDER BY cid";

        pub const PRIMARY_KEY: &str =
            "SELECT name AS column_name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk";

        pub const PRIMARY_KEY_IN_SCHEMA: &str = "SELECT name AS column_name \
             FROM pragma_table_info(?, ?) WHERE pk > 0 ORDER BY pk";
    }
}
