//! The connection and execution gateway.
//!
//! A [`Gateway`] owns the pool for one database and is the single point of
//! contact with it: statement execution, catalog introspection, the
//! transactional insert and the SELECT builders all live here.
//!
//! Reads and writes fail differently. [`Gateway::get_sql_array`] and the
//! `fetch_*` builders log a failed statement at `warn` and return no rows;
//! [`Gateway::execute_sql`] and [`Gateway::run_insert`] return the error.
//! Use [`Gateway::try_get_sql_array`] when a read failure must be seen.

use crate::config::GatewayConfig;
use crate::db::executor;
use crate::db::pool::{DbPool, create_pool};
use crate::db::schema::SchemaInspector;
use crate::db::sql;
use crate::error::{DbError, DbResult};
use crate::models::{
    Combinator, DatabaseType, FetchOptions, Filter, QueryParam, Row, Statement, TableMeta,
    TableSchema, ValueList,
};
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

static INSTANCE: OnceCell<Gateway> = OnceCell::const_new();

/// Handle to one database. Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct Gateway {
    pool: DbPool,
}

impl Gateway {
    /// Open a new gateway from `config`.
    pub async fn connect(config: &GatewayConfig) -> DbResult<Self> {
        let pool = create_pool(config).await?;
        Ok(Self { pool })
    }

    /// Wrap an already opened pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The process-wide gateway, opened from `config` on first use.
    ///
    /// Later calls return the same gateway and ignore `config`. A failed
    /// first attempt leaves nothing behind, so the next call tries again.
    pub async fn get_instance(config: &GatewayConfig) -> DbResult<Self> {
        if let Some(gateway) = INSTANCE.get() {
            return Ok(gateway.clone());
        }
        let gateway = INSTANCE
            .get_or_try_init(|| async {
                info!("Initializing process-wide gateway");
                Self::connect(config).await
            })
            .await?;
        Ok(gateway.clone())
    }

    /// The process-wide gateway if it has been opened.
    pub fn instance() -> Option<Self> {
        INSTANCE.get().cloned()
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Close the pool. Every clone of this gateway is closed with it.
    pub async fn close(&self) {
        self.pool.close().await;
        info!(db_type = %self.db_type(), "Gateway closed");
    }

    // =========================================================================
    // Schema introspection
    // =========================================================================

    /// Column name to data type for `table`; empty when the table is unknown.
    pub async fn fetch_table_meta(&self, table: &str) -> DbResult<TableMeta> {
        SchemaInspector::table_meta(&self.pool, table).await
    }

    /// The single primary-key column of `table`.
    ///
    /// Fails with [`DbError::Schema`] when the table has no primary key or a
    /// composite one.
    pub async fn fetch_table_pk(&self, table: &str) -> DbResult<String> {
        let mut columns = SchemaInspector::primary_key_columns(&self.pool, table).await?;
        match columns.len() {
            0 => Err(DbError::schema(
                format!("Table '{}' has no primary key", table),
                table,
            )),
            1 => Ok(columns.remove(0)),
            _ => Err(DbError::schema(
                format!(
                    "Composite primary key ({}) is not supported",
                    columns.join(", ")
                ),
                table,
            )),
        }
    }

    /// Columns and primary key of `table`.
    pub async fn fetch_table_schema(&self, table: &str) -> DbResult<TableSchema> {
        let columns = self.fetch_table_meta(table).await?;
        if columns.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' not found", table),
                table,
            ));
        }
        let primary_key = self.fetch_table_pk(table).await?;
        Ok(TableSchema::new(table, columns, primary_key))
    }

    // =========================================================================
    // Statement execution
    // =========================================================================

    /// Run a read and return its rows, or no rows if the statement fails.
    ///
    /// The failure is logged at `warn`, never returned.
    pub async fn get_sql_array(&self, sql: &str, params: &[JsonValue]) -> Vec<Row> {
        match self.try_get_sql_array(sql, params).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(sql = %sql, error = %e, "Read failed, returning no rows");
                Vec::new()
            }
        }
    }

    /// Run a read and return its rows or the error.
    pub async fn try_get_sql_array(&self, sql: &str, params: &[JsonValue]) -> DbResult<Vec<Row>> {
        executor::fetch_rows(&self.pool, sql, &QueryParam::from_values(params)).await
    }

    /// Run a non-returning statement; returns the rows affected.
    pub async fn execute_sql(&self, sql: &str, params: &[JsonValue]) -> DbResult<u64> {
        self.execute_params(sql, &QueryParam::from_values(params)).await
    }

    /// [`Gateway::execute_sql`] with parameters already in bind-time form.
    pub async fn execute_params(&self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        executor::execute(&self.pool, sql, params).await
    }

    /// Run an INSERT in its own transaction and return the generated key.
    ///
    /// `key_column` names the generated column. PostgreSQL needs it to read
    /// the key back; MySQL and SQLite report the generated key regardless.
    pub async fn run_insert(
        &self,
        sql: &str,
        params: &[JsonValue],
        key_column: Option<&str>,
    ) -> DbResult<JsonValue> {
        self.insert_params(sql, &QueryParam::from_values(params), key_column)
            .await
    }

    /// [`Gateway::run_insert`] with parameters already in bind-time form.
    pub async fn insert_params(
        &self,
        sql: &str,
        params: &[QueryParam],
        key_column: Option<&str>,
    ) -> DbResult<JsonValue> {
        executor::insert_returning_id(&self.pool, sql, params, key_column).await
    }

    // =========================================================================
    // Query builders
    // =========================================================================

    /// Rows of `table` where `field OP value` holds for every value given.
    ///
    /// With `invert` each comparison reads `value OP field`. `null` values are
    /// skipped and an empty `field` applies no filter.
    #[allow(clippy::too_many_arguments)]
    pub async fn fetch_table_data(
        &self,
        table: &str,
        field: &str,
        values: impl Into<ValueList>,
        operator: &str,
        order_by: &[String],
        invert: bool,
        limit: Option<u64>,
        fields: &str,
    ) -> DbResult<Vec<Row>> {
        let filters = sql::field_filters(field, values, operator, invert);
        self.fetch_table_data_f(table, &filters, order_by, limit, Combinator::And, fields)
            .await
    }

    /// Rows of `table` matching `filters` joined with `combinator`.
    ///
    /// Returns an error only when the statement cannot be assembled; a failed
    /// read yields no rows like [`Gateway::get_sql_array`].
    pub async fn fetch_table_data_f(
        &self,
        table: &str,
        filters: &[Filter],
        order_by: &[String],
        limit: Option<u64>,
        combinator: Combinator,
        fields: &str,
    ) -> DbResult<Vec<Row>> {
        let statement =
            sql::select_statement(table, filters, order_by, limit, combinator, fields)?;
        Ok(self.fetch_statement(&statement).await)
    }

    /// [`Gateway::fetch_table_data_f`] driven by an options object.
    pub async fn fetch_simple_data(&self, table: &str, options: &FetchOptions) -> DbResult<Vec<Row>> {
        self.fetch_table_data_f(
            table,
            &options.filter,
            &options.orderby,
            options.limit,
            options.and_or,
            &options.fields,
        )
        .await
    }

    /// Turn a column to value mapping into one filter per entry.
    ///
    /// See [`sql::assemble_filter`].
    pub fn assemble_filter(values: &Row, operator: &str) -> Vec<Filter> {
        sql::assemble_filter(values, operator)
    }

    async fn fetch_statement(&self, statement: &Statement) -> Vec<Row> {
        debug!(sql = %statement.sql, "Running assembled select");
        match executor::fetch_rows(&self.pool, &statement.sql, &statement.bind_params()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(sql = %statement.sql, error = %e, "Read failed, returning no rows");
                Vec::new()
            }
        }
    }
}
