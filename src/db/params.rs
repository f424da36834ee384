//! Parameter binding utilities for database queries.
//!
//! Statements carry their parameters as JSON values; these functions bind the
//! [`QueryParam`] form of each value to a database-specific query object, in
//! placeholder order.
//!
//! PostgreSQL does not convert a `text` parameter into a NUMERIC, DATE,
//! TIMESTAMP or UUID column. Values written to known columns therefore go
//! through [`column_params`], which uses the column's catalog type to send
//! such text as a typed value.

use crate::db::types::{TypeCategory, categorize_type};
use crate::models::{DatabaseType, QueryParam, TableMeta};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite, Type};
use std::str::FromStr;
use uuid::Uuid;

/// SQL NULL sent to PostgreSQL with the `unknown` type, so the server infers
/// the column type instead of rejecting a `text` NULL for a numeric column.
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("unknown")
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Parameters for values written to named columns of one table.
///
/// Each `(column, value)` pair is converted with [`typed_param`] using the
/// column's data type from `meta`. Only PostgreSQL gets typed values; the
/// other backends convert text themselves and receive plain parameters.
pub fn column_params<'a>(
    db_type: DatabaseType,
    meta: &TableMeta,
    bindings: impl IntoIterator<Item = (&'a str, &'a JsonValue)>,
) -> Vec<QueryParam> {
    bindings
        .into_iter()
        .map(|(column, value)| match (db_type, meta.data_type(column)) {
            (DatabaseType::PostgreSQL, Some(data_type)) => {
                typed_param(value, categorize_type(data_type, db_type))
            }
            _ => QueryParam::from(value),
        })
        .collect()
}

/// Bind-time form of `value` for a column of `category`.
///
/// Text that parses as the column's type becomes the typed variant; anything
/// else converts as plain JSON and is left for the server to judge.
pub fn typed_param(value: &JsonValue, category: TypeCategory) -> QueryParam {
    let JsonValue::String(text) = value else {
        return QueryParam::from(value);
    };
    let text = text.trim();

    let typed = match category {
        TypeCategory::Integer => text.parse().ok().map(QueryParam::Int),
        TypeCategory::Float => text.parse().ok().map(QueryParam::Float),
        TypeCategory::Decimal => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .ok()
            .map(QueryParam::Decimal),
        TypeCategory::Date => text.parse().ok().map(QueryParam::Date),
        TypeCategory::Time => text.parse::<NaiveTime>().ok().map(QueryParam::Time),
        TypeCategory::DateTime => parse_timestamp(text).map(QueryParam::Timestamp),
        TypeCategory::DateTimeTz => parse_timestamp_tz(text).map(QueryParam::TimestampTz),
        TypeCategory::Uuid => Uuid::parse_str(text).ok().map(QueryParam::Uuid),
        _ => None,
    };
    typed.unwrap_or_else(|| QueryParam::from(value))
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| text.parse::<NaiveDateTime>())
        .ok()
        .or_else(|| {
            text.parse::<NaiveDate>()
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_timestamp_tz(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|v| v.with_timezone(&Utc))
        .ok()
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
        QueryParam::Decimal(v) => query.bind(*v),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Time(v) => query.bind(*v),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::TimestampTz(v) => query.bind(*v),
        // MySQL has no UUID type; CHAR(36) columns hold the hyphenated text
        QueryParam::Uuid(v) => query.bind(v.to_string()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(UntypedNull),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
        QueryParam::Decimal(v) => query.bind(*v),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Time(v) => query.bind(*v),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::TimestampTz(v) => query.bind(*v),
        QueryParam::Uuid(v) => query.bind(*v),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // SQLite doesn't have native JSON type, store as string
        QueryParam::Json(v) => query.bind(v.to_string()),
        QueryParam::Decimal(v) => query.bind(v.to_string()),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Time(v) => query.bind(*v),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::TimestampTz(v) => query.bind(*v),
        QueryParam::Uuid(v) => query.bind(v.to_string()),
    }
}
