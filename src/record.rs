//! Generic record: one row of an arbitrary table.
//!
//! A [`Record`] holds its table's [`TableSchema`] and an ordered field map.
//! Fields can be set freely; anything that is not a column of the table is
//! stripped when the record is persisted.
//!
//! The primary key decides between insert and update. A key that is absent
//! or `null` is *unset* and [`Record::post`] inserts; any other value,
//! including `0` and `""`, is a real key and `post` updates.

use crate::db::Gateway;
use crate::db::params::column_params;
use crate::db::sql::{delete_statement, field_filters, insert_statement, update_statement};
use crate::error::{DbError, DbResult};
use crate::models::{
    Combinator, DEFAULT_FIELDS, DEFAULT_ID_FIELD, QueryParam, Row, Statement, TableSchema,
    ValueList,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::iter;
use tracing::debug;

/// What [`Record::post`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// A new row was written; carries its primary key.
    Inserted(JsonValue),
    /// An existing row was rewritten; carries the rows affected.
    Updated(u64),
}

/// One row of `schema.table_name`, bound to the gateway it persists through.
#[derive(Debug, Clone)]
pub struct Record {
    gateway: Gateway,
    schema: TableSchema,
    data: Row,
}

impl Record {
    /// A fresh, unsaved record with every column set to `null`.
    pub async fn new(gateway: &Gateway, table: &str) -> DbResult<Self> {
        let schema = gateway.fetch_table_schema(table).await?;
        let data = schema
            .columns
            .column_names()
            .map(|name| (name.to_string(), JsonValue::Null))
            .collect();
        Ok(Self::from_schema(gateway, schema, data))
    }

    /// A record adopting `data` as-is, typically a row from a query.
    pub async fn with_data(gateway: &Gateway, table: &str, data: Row) -> DbResult<Self> {
        let schema = gateway.fetch_table_schema(table).await?;
        Ok(Self::from_schema(gateway, schema, data))
    }

    /// A record over an already fetched schema.
    pub fn from_schema(gateway: &Gateway, schema: TableSchema, data: Row) -> Self {
        Self {
            gateway: gateway.clone(),
            schema,
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.data.get(field)
    }

    /// Set a field. Unknown columns are accepted here and stripped on persist.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> &mut Self {
        self.data.insert(field.into(), value.into());
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<JsonValue> {
        self.data.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn table(&self) -> &str {
        &self.schema.table_name
    }

    pub fn primary_key(&self) -> &str {
        &self.schema.primary_key
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn into_data(self) -> Row {
        self.data
    }

    /// The primary-key value, `None` while it is unset.
    pub fn key(&self) -> Option<&JsonValue> {
        self.data.get(&self.schema.primary_key).filter(|v| !v.is_null())
    }

    /// Whether the primary key is unset, so [`Record::post`] would insert.
    pub fn is_new(&self) -> bool {
        self.key().is_none()
    }

    /// Fields in insertion order. Call again to start over.
    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.data.iter()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Insert when the key is unset, update otherwise.
    pub async fn post(&mut self) -> DbResult<PostOutcome> {
        if self.is_new() {
            self.insert().await.map(PostOutcome::Inserted)
        } else {
            self.update().await.map(PostOutcome::Updated)
        }
    }

    /// Write the record as a new row and return its primary key.
    ///
    /// An unset key is left out of the statement and the generated key is
    /// stored back into the record. A key set by the caller is written and
    /// returned unchanged.
    pub async fn insert(&mut self) -> DbResult<JsonValue> {
        self.strip_unknown();
        let pk = self.schema.primary_key.clone();

        let mut fields = self.data.clone();
        let supplied_key = self.key().cloned();
        if supplied_key.is_none() {
            fields.shift_remove(&pk);
        }

        let statement = insert_statement(self.table(), &fields)?;
        let params = self.typed_params(fields.keys().map(String::as_str), &statement);
        debug!(table = %self.table(), fields = fields.len(), "Inserting record");
        let generated = self
            .gateway
            .insert_params(&statement.sql, &params, Some(&pk))
            .await?;

        match supplied_key {
            Some(key) => Ok(key),
            None => {
                self.data.insert(pk, generated.clone());
                Ok(generated)
            }
        }
    }

    /// Rewrite every known field of the row identified by the key.
    pub async fn update(&mut self) -> DbResult<u64> {
        self.strip_unknown();
        let key = self.require_key("update")?;
        let statement = update_statement(self.table(), self.primary_key(), &key, &self.data)?;
        let columns = self
            .data
            .keys()
            .map(String::as_str)
            .chain(iter::once(self.primary_key()));
        let params = self.typed_params(columns, &statement);
        debug!(table = %self.table(), key = %key, "Updating record");
        self.gateway.execute_params(&statement.sql, &params).await
    }

    /// Delete the row identified by the key. The record keeps its fields.
    pub async fn delete(&mut self) -> DbResult<u64> {
        self.strip_unknown();
        let key = self.require_key("delete")?;
        let statement = delete_statement(self.table(), self.primary_key(), &key)?;
        let params = self.typed_params(iter::once(self.primary_key()), &statement);
        debug!(table = %self.table(), key = %key, "Deleting record");
        self.gateway.execute_params(&statement.sql, &params).await
    }

    /// Statement parameters typed by the columns they are written to.
    fn typed_params<'a>(
        &self,
        columns: impl IntoIterator<Item = &'a str>,
        statement: &'a Statement,
    ) -> Vec<QueryParam> {
        column_params(
            self.gateway.db_type(),
            &self.schema.columns,
            columns.into_iter().zip(&statement.params),
        )
    }

    fn strip_unknown(&mut self) {
        let columns = &self.schema.columns;
        self.data.retain(|field, _| columns.contains(field));
    }

    fn require_key(&self, action: &str) -> DbResult<JsonValue> {
        self.key().cloned().ok_or_else(|| {
            DbError::invalid_input(format!(
                "Cannot {} a '{}' record without a value for primary key '{}'",
                action,
                self.table(),
                self.primary_key()
            ))
        })
    }

    // =========================================================================
    // Finders
    // =========================================================================

    /// The first row of `table` whose `field` equals `id`, or `None`.
    ///
    /// A `null` id matches nothing.
    pub async fn fetch(
        gateway: &Gateway,
        table: &str,
        id: impl Into<JsonValue>,
        field: &str,
    ) -> DbResult<Option<Record>> {
        let id = id.into();
        let schema = gateway.fetch_table_schema(table).await?;
        if id.is_null() {
            return Ok(None);
        }

        let rows = gateway
            .fetch_table_data(table, field, vec![id], "=", &[], false, Some(1), DEFAULT_FIELDS)
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Self::from_schema(gateway, schema, row)))
    }

    /// [`Record::fetch`] on the `ID` column.
    pub async fn fetch_by_id(
        gateway: &Gateway,
        table: &str,
        id: impl Into<JsonValue>,
    ) -> DbResult<Option<Record>> {
        Self::fetch(gateway, table, id, DEFAULT_ID_FIELD).await
    }

    /// Every row of `table` whose `field` equals one of `ids`, ordered by `field`.
    ///
    /// No ids (or only `null` ids) gives no records without a query.
    pub async fn fetch_list(
        gateway: &Gateway,
        table: &str,
        ids: impl Into<ValueList>,
        field: &str,
    ) -> DbResult<Vec<Record>> {
        let filters = field_filters(field, ids, "=", false);
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let schema = gateway.fetch_table_schema(table).await?;
        let rows = gateway
            .fetch_table_data_f(
                table,
                &filters,
                &[field.to_string()],
                None,
                Combinator::Or,
                DEFAULT_FIELDS,
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Self::from_schema(gateway, schema.clone(), row))
            .collect())
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a JsonValue);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

/// Re-key `rows` by the text of `index_field`.
///
/// Strings are used verbatim and other values by their JSON text. Rows where
/// the field is missing or `null` are skipped; a repeated key keeps the last row.
pub fn index_result_set(
    rows: impl IntoIterator<Item = Row>,
    index_field: &str,
) -> BTreeMap<String, Row> {
    let mut index = BTreeMap::new();
    for row in rows {
        let key = match row.get(index_field) {
            None | Some(JsonValue::Null) => continue,
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        index.insert(key, row);
    }
    index
}
