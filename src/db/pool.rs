//! Connection pool management.
//!
//! This module opens the database-specific pool (MySqlPool, PgPool,
//! SqlitePool) behind a [`Gateway`](crate::db::Gateway) so every backend keeps
//! its full native type support.

use crate::config::GatewayConfig;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgConnectOptions, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    /// Get the server version from the connected database.
    pub async fn server_version(&self) -> Option<String> {
        let result = match self {
            DbPool::MySql(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::SQLite(pool) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(pool)
                    .await
            }
        };

        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

/// Open a pool for the rendered DSN in `config`.
///
/// Credentials from the `user`/`password` keys are applied on top of the DSN
/// for MySQL and PostgreSQL. MySQL sessions use `utf8mb4`; PostgreSQL and
/// SQLite sessions are UTF-8 already. SQLite files are created when missing.
pub async fn create_pool(config: &GatewayConfig) -> DbResult<DbPool> {
    config.pool.validate()?;
    let db_type = config.database_type()?;
    let dsn = config.render_dsn();

    let pool_opts = &config.pool;
    let is_sqlite = db_type == DatabaseType::SQLite;
    let max_connections = pool_opts.max_connections_or_default(is_sqlite);
    let min_connections = pool_opts.min_connections_or_default(is_sqlite);
    let acquire_timeout = Duration::from_secs(pool_opts.acquire_timeout_or_default());
    let idle_timeout = Some(Duration::from_secs(pool_opts.idle_timeout_or_default()));
    let test_before_acquire = pool_opts.test_before_acquire_or_default();

    info!(
        db_type = %db_type,
        dsn = %config.masked_dsn(),
        max_connections,
        "Connecting to database"
    );

    let user = config.user.as_deref().filter(|u| !u.is_empty());
    let password = config.password.as_deref().filter(|p| !p.is_empty());

    let pool = match db_type {
        DatabaseType::MySQL => {
            let mut options = MySqlConnectOptions::from_str(&dsn)
                .map_err(|e| {
                    DbError::connection(
                        format!("Invalid MySQL connection string: {}", e),
                        "Check the DSN format: mysql://host:port/database",
                    )
                })?
                .charset("utf8mb4");
            if let Some(user) = user {
                options = options.username(user);
            }
            if let Some(password) = password {
                options = options.password(password);
            }

            let pool = MySqlPoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| {
                    DbError::connection(
                        format!("Failed to connect: {}", e),
                        connection_suggestion(db_type, &e),
                    )
                })?;
            DbPool::MySql(pool)
        }
        DatabaseType::PostgreSQL => {
            let mut options = PgConnectOptions::from_str(&dsn).map_err(|e| {
                DbError::connection(
                    format!("Invalid PostgreSQL connection string: {}", e),
                    "Check the DSN format: postgres://host:5432/database",
                )
            })?;
            if let Some(user) = user {
                options = options.username(user);
            }
            if let Some(password) = password {
                options = options.password(password);
            }

            let pool = PgPoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| {
                    DbError::connection(
                        format!("Failed to connect: {}", e),
                        connection_suggestion(db_type, &e),
                    )
                })?;
            DbPool::Postgres(pool)
        }
        DatabaseType::SQLite => {
            let options = SqliteConnectOptions::from_str(&dsn)
                .map_err(|e| {
                    DbError::connection(
                        format!("Invalid SQLite connection string: {}", e),
                        "Check the DSN format: sqlite:path/to/db.sqlite",
                    )
                })?
                .create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| {
                    DbError::connection(
                        format!("Failed to connect: {}", e),
                        connection_suggestion(db_type, &e),
                    )
                })?;
            DbPool::SQLite(pool)
        }
    };

    let server_version = pool.server_version().await;
    info!(db_type = %db_type, server_version = ?server_version, "Connected successfully");

    Ok(pool)
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password in the configuration file".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL => {
            "Verify the DSN format: postgres://host:5432/db".to_string()
        }
        DatabaseType::MySQL => "Verify the DSN format: mysql://host:3306/db".to_string(),
        DatabaseType::SQLite => {
            "Verify the directory exists and is writable: sqlite:path/to/db.sqlite".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_suggestion_refused() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        let suggestion = connection_suggestion(DatabaseType::MySQL, &err);
        assert!(suggestion.contains("MySQL server is running"));
    }

    #[test]
    fn test_connection_suggestion_falls_back_to_format_hint() {
        let err = sqlx::Error::PoolTimedOut;
        assert!(connection_suggestion(DatabaseType::PostgreSQL, &err).contains("postgres://"));
        assert!(connection_suggestion(DatabaseType::SQLite, &err).contains("sqlite:"));
    }

    #[tokio::test]
    async fn test_create_pool_rejects_unknown_scheme() {
        let err = create_pool(&GatewayConfig::new("oracle://host/db"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_create_pool_sqlite_in_memory() {
        let pool = create_pool(&GatewayConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        assert_eq!(pool.db_type(), DatabaseType::SQLite);
        assert!(pool.server_version().await.is_some());
        pool.close().await;
        assert!(pool.is_closed());
    }
}
