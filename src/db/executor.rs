//! Statement execution.
//!
//! This module runs SQL against a [`DbPool`]:
//! - Row-returning statements, materialized as ordered [`Row`] maps
//! - Non-returning statements, reporting rows affected
//! - The transactional insert that also reads back the generated key
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch, execute and insert
//! - `postgres`: PostgreSQL-specific fetch, execute and insert
//! - `sqlite`: SQLite-specific fetch, execute and insert
//!
//! SQL arrives with `?` placeholders. The PostgreSQL module rewrites them to
//! `$1..$n` before preparing; SQL that already uses `$n` passes through.
//! Nothing here retries or times out a statement.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Row};
use futures_util::{Stream, TryStreamExt};
use serde_json::Value as JsonValue;
use sqlx::{Database, Transaction};
use tracing::{debug, warn};

fn param_types(params: &[QueryParam]) -> Vec<&'static str> {
    params.iter().map(QueryParam::type_name).collect()
}

/// Run a row-returning statement and materialize every row in result order.
pub async fn fetch_rows(pool: &DbPool, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
    debug!(sql = %sql, params = ?param_types(params), "Executing query");

    match pool {
        DbPool::MySql(p) => mysql::fetch_rows(p, sql, params).await,
        DbPool::Postgres(p) => postgres::fetch_rows(p, sql, params).await,
        DbPool::SQLite(p) => sqlite::fetch_rows(p, sql, params).await,
    }
}

/// Run a non-returning statement and report the rows it affected.
pub async fn execute(pool: &DbPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
    debug!(sql = %sql, params = ?param_types(params), "Executing statement");

    let rows_affected = match pool {
        DbPool::MySql(p) => mysql::execute(p, sql, params).await?,
        DbPool::Postgres(p) => postgres::execute(p, sql, params).await?,
        DbPool::SQLite(p) => sqlite::execute(p, sql, params).await?,
    };

    debug!(rows_affected, "Statement executed");
    Ok(rows_affected)
}

/// Run an INSERT inside its own transaction and return the generated key.
///
/// Begin, execute, read the key, commit. Any failure rolls the transaction
/// back before the error is returned. PostgreSQL reads the key through
/// `RETURNING <key_column>`, or `lastval()` when no key column is given.
pub async fn insert_returning_id(
    pool: &DbPool,
    sql: &str,
    params: &[QueryParam],
    key_column: Option<&str>,
) -> DbResult<JsonValue> {
    debug!(
        sql = %sql,
        params = ?param_types(params),
        key_column = ?key_column,
        "Executing insert"
    );

    match pool {
        DbPool::MySql(p) => mysql::insert_returning_id(p, sql, params).await,
        DbPool::Postgres(p) => postgres::insert_returning_id(p, sql, params, key_column).await,
        DbPool::SQLite(p) => sqlite::insert_returning_id(p, sql, params).await,
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

async fn collect_rows<R, S>(stream: S) -> DbResult<Vec<Row>>
where
    R: RowToJson,
    S: Stream<Item = Result<R, sqlx::Error>>,
{
    stream
        .map_ok(|row| row.to_row())
        .map_err(DbError::from)
        .try_collect()
        .await
}

/// Commit on success, roll back on failure.
async fn finish_insert<DB: Database>(
    tx: Transaction<'_, DB>,
    outcome: DbResult<JsonValue>,
) -> DbResult<JsonValue> {
    match outcome {
        Ok(id) => {
            tx.commit().await?;
            debug!(id = %id, "Insert committed");
            Ok(id)
        }
        Err(e) => {
            warn!(error = %e, "Insert failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::{Executor, MySqlPool};

    pub async fn fetch_rows(pool: &MySqlPool, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        // When params is empty, use raw SQL to avoid prepared statement issues
        if params.is_empty() {
            return collect_rows(pool.fetch(sql)).await;
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        collect_rows(query.fetch(pool)).await
    }

    pub async fn execute(pool: &MySqlPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let result = if params.is_empty() {
            pool.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(pool).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert_returning_id(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue> {
        let mut tx = pool.begin().await?;

        let outcome = async {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            let result = query.execute(&mut *tx).await?;
            Ok::<_, DbError>(JsonValue::from(result.last_insert_id()))
        }
        .await;

        finish_insert(tx, outcome).await
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use crate::db::sql::{count_placeholders, numbered_placeholders, validate_identifier};
    use sqlx::{Executor, PgPool};
    use std::borrow::Cow;

    fn prepare(sql: &str) -> Cow<'_, str> {
        if count_placeholders(sql) > 0 {
            Cow::Owned(numbered_placeholders(sql))
        } else {
            Cow::Borrowed(sql)
        }
    }

    pub async fn fetch_rows(pool: &PgPool, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        if params.is_empty() {
            return collect_rows(pool.fetch(sql)).await;
        }

        let sql = prepare(sql);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        collect_rows(query.fetch(pool)).await
    }

    pub async fn execute(pool: &PgPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let result = if params.is_empty() {
            pool.execute(sql).await?
        } else {
            let sql = prepare(sql);
            let mut query = sqlx::query(&sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(pool).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert_returning_id(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        key_column: Option<&str>,
    ) -> DbResult<JsonValue> {
        if let Some(key) = key_column {
            validate_identifier(key)?;
        }
        let mut sql = prepare(sql).into_owned();
        if let Some(key) = key_column {
            sql.push_str(" RETURNING ");
            sql.push_str(key);
        }

        let mut tx = pool.begin().await?;

        let outcome = async {
            let mut query = sqlx::query(&sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }

            match key_column {
                Some(key) => {
                    let row = query.fetch_one(&mut *tx).await?;
                    row.to_row().remove(key).ok_or_else(|| {
                        DbError::internal(format!("Insert did not return column '{}'", key))
                    })
                }
                None => {
                    query.execute(&mut *tx).await?;
                    let id: i64 = sqlx::query_scalar("SELECT lastval()")
                        .fetch_one(&mut *tx)
                        .await?;
                    Ok(JsonValue::from(id))
                }
            }
        }
        .await;

        finish_insert(tx, outcome).await
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::{Executor, SqlitePool};

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Row>> {
        if params.is_empty() {
            return collect_rows(pool.fetch(sql)).await;
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        collect_rows(query.fetch(pool)).await
    }

    pub async fn execute(pool: &SqlitePool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let result = if params.is_empty() {
            pool.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(pool).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert_returning_id(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue> {
        let mut tx = pool.begin().await?;

        let outcome = async {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            let result = query.execute(&mut *tx).await?;
            Ok::<_, DbError>(JsonValue::from(result.last_insert_rowid()))
        }
        .await;

        finish_insert(tx, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::db::pool::create_pool;
    use serde_json::json;

    async fn memory_pool() -> DbPool {
        let pool = create_pool(&GatewayConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        execute(
            &pool,
            "CREATE TABLE items (ID INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT UNIQUE, price REAL)",
            &[],
        )
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_returns_generated_rowid() {
        let pool = memory_pool().await;
        let params = vec![QueryParam::String("pen".into()), QueryParam::Float(1.5)];
        let id = insert_returning_id(
            &pool,
            "INSERT INTO items(name, price) VALUES(?, ?)",
            &params,
            Some("ID"),
        )
        .await
        .unwrap();
        assert_eq!(id, json!(1));

        let rows = fetch_rows(&pool, "SELECT * FROM items", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("pen"));
        assert_eq!(rows[0]["price"], json!(1.5));
    }

    #[tokio::test]
    async fn test_failed_insert_is_rolled_back() {
        let pool = memory_pool().await;
        let params = vec![QueryParam::String("pen".into()), QueryParam::Null];
        let sql = "INSERT INTO items(name, price) VALUES(?, ?)";
        insert_returning_id(&pool, sql, &params, None).await.unwrap();

        let err = insert_returning_id(&pool, sql, &params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.code().is_some());

        let rows = fetch_rows(&pool, "SELECT COUNT(*) AS n FROM items", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], json!(1));
    }

    #[tokio::test]
    async fn test_execute_reports_rows_affected() {
        let pool = memory_pool().await;
        for name in ["a", "b", "c"] {
            let params = vec![QueryParam::String(name.into())];
            execute(&pool, "INSERT INTO items(name) VALUES(?)", &params)
                .await
                .unwrap();
        }
        let affected = execute(
            &pool,
            "UPDATE items SET price = ? WHERE name <> ?",
            &[QueryParam::Int(2), QueryParam::String("a".into())],
        )
        .await
        .unwrap();
        assert_eq!(affected, 2);
    }

    #[tokio::test]
    async fn test_fetch_rows_preserves_column_order() {
        let pool = memory_pool().await;
        let rows = fetch_rows(&pool, "SELECT 2 AS zeta, 'x' AS alpha, NULL AS mid", &[])
            .await
            .unwrap();
        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["zeta", "alpha", "mid"]);
        assert_eq!(rows[0]["mid"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_fetch_rows_reports_syntax_error() {
        let pool = memory_pool().await;
        let err = fetch_rows(&pool, "SELEC nothing", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
    }
}
