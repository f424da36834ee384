//! SQL text assembly.
//!
//! Everything here is pure: it turns filter descriptors and field maps into a
//! [`Statement`] (SQL with `?` placeholders plus ordered parameters) without
//! touching a database. Values never reach the SQL text; only identifiers and
//! caller-authored fragments do.
//!
//! Table and column names that end up in generated SQL must be plain
//! identifiers. Select lists, ORDER BY entries and filter fragments are
//! caller-authored SQL and are passed through untouched.

use crate::error::{DbError, DbResult};
use crate::models::{Combinator, Filter, Row, Statement, ValueList};
use serde_json::Value as JsonValue;

/// Operator that [`assemble_filter`] rewrites into a substring match.
pub const CONTAINING: &str = "CONTAINING";

/// Pattern-match operator used for [`CONTAINING`].
const LIKE: &str = "LIKE";

/// Check that `name` is a plain (optionally schema-qualified) identifier.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    fn is_plain(part: &str) -> bool {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    }

    let mut parts = name.split('.');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => is_plain(table),
        (Some(schema), Some(table), None) => is_plain(schema) && is_plain(table),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "'{}' is not a valid identifier",
            name
        )))
    }
}

/// Scan `sql` and call `on_placeholder` for every `?` outside quoted text
/// and comments.
///
/// Single quotes, double quotes and backticks delimit quoted text; a doubled
/// quote inside a literal closes and reopens it and needs no special case.
/// `--` comments run to the end of the line, `/* */` comments to their
/// terminator, and `$$` or `$tag$` dollar-quoted bodies to the same tag.
fn scan_placeholders(sql: &str, mut on_placeholder: impl FnMut(usize)) {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        i = match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => skip_past(bytes, i + 1, &[q]),
            b'-' if bytes.get(i + 1) == Some(&b'-') => skip_past(bytes, i + 2, b"\n"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_past(bytes, i + 2, b"*/"),
            b'$' => match dollar_tag(bytes, i) {
                Some(tag) => skip_past(bytes, i + tag.len(), tag),
                None => i + 1,
            },
            b'?' => {
                on_placeholder(i);
                i + 1
            }
            _ => i + 1,
        };
    }
}

/// Index just past the next `needle` at or after `from`, or the end of input.
fn skip_past(bytes: &[u8], from: usize, needle: &[u8]) -> usize {
    bytes
        .get(from..)
        .and_then(|rest| rest.windows(needle.len()).position(|w| w == needle))
        .map_or(bytes.len(), |pos| from + pos + needle.len())
}

/// The dollar-quote opening tag starting at `start`, if there is one.
///
/// `$1` is a positional parameter and `a$b` an identifier, not a tag.
fn dollar_tag(bytes: &[u8], start: usize) -> Option<&[u8]> {
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80;
    if start > 0 && (is_ident(bytes[start - 1]) || bytes[start - 1] == b'$') {
        return None;
    }
    let body = start + 1;
    let end = body
        + bytes[body..]
            .iter()
            .take_while(|b| is_ident(**b))
            .count();
    let starts_with_digit = bytes.get(body).is_some_and(u8::is_ascii_digit);
    match bytes.get(end) {
        Some(b'$') if !starts_with_digit => Some(&bytes[start..=end]),
        _ => None,
    }
}

/// Count the `?` placeholders in `sql`.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan_placeholders(sql, |_| count += 1);
    count
}

/// Rewrite `?` placeholders to `$1, $2, ...` for PostgreSQL.
pub fn numbered_placeholders(sql: &str) -> String {
    let mut positions = Vec::new();
    scan_placeholders(sql, |idx| positions.push(idx));
    if positions.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut last = 0;
    for (n, idx) in positions.into_iter().enumerate() {
        out.push_str(&sql[last..idx]);
        out.push('$');
        out.push_str(&(n + 1).to_string());
        last = idx + 1;
    }
    out.push_str(&sql[last..]);
    out
}

/// Ensure the placeholders across `sql` match the number of parameters.
pub fn check_placeholders(sql: &str, params: usize) -> DbResult<()> {
    let found = count_placeholders(sql);
    if found == params {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Statement has {} placeholder(s) but {} parameter(s) were supplied",
            found, params
        )))
    }
}

/// Turn a column to value mapping into filters, one per entry.
///
/// `CONTAINING` becomes `column LIKE ?` with the value wrapped in `%`; any
/// other operator is used verbatim and the value is passed through unchanged.
pub fn assemble_filter(values: &Row, operator: &str) -> Vec<Filter> {
    let containing = operator == CONTAINING;
    values
        .iter()
        .map(|(column, value)| {
            if containing {
                Filter::new(
                    format!("{} {} ?", column, LIKE),
                    format!("%{}%", pattern_text(value)),
                )
            } else {
                Filter::new(format!("{} {} ?", column, operator), value.clone())
            }
        })
        .collect()
}

fn pattern_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Build filters comparing one field against one or many values.
///
/// `null` values are skipped and an empty `field` yields no filters. With
/// `invert` the operands swap (`? OP field`), which some dialects need for
/// pattern operators whose literal must be on the left.
pub fn field_filters(
    field: &str,
    values: impl Into<ValueList>,
    operator: &str,
    invert: bool,
) -> Vec<Filter> {
    if field.is_empty() {
        return Vec::new();
    }

    values
        .into()
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|value| {
            let query = if invert {
                format!("? {} {}", operator, field)
            } else {
                format!("{} {} ?", field, operator)
            };
            Filter::new(query, value)
        })
        .collect()
}

/// Assemble `SELECT <fields> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT n]`.
///
/// Each clause is omitted when its input is empty; blank ORDER BY entries are
/// dropped. Fails when `table` is not an identifier or the filter fragments
/// carry a different number of placeholders than filters.
pub fn select_statement(
    table: &str,
    filters: &[Filter],
    order_by: &[String],
    limit: Option<u64>,
    combinator: Combinator,
    fields: &str,
) -> DbResult<Statement> {
    validate_identifier(table)?;

    let fields = match fields.trim() {
        "" => "*",
        f => f,
    };
    let mut sql = format!("SELECT {} FROM {}", fields, table);

    let clauses: Vec<&str> = filters
        .iter()
        .map(|f| f.query.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(&format!(" {} ", combinator.as_sql())));
    }

    let order: Vec<&str> = order_by
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let params: Vec<JsonValue> = filters.iter().map(|f| f.param.clone()).collect();
    check_placeholders(&sql, params.len())?;

    Ok(Statement::new(sql, params))
}

/// Assemble `INSERT INTO <table>(<c1>, <c2>) VALUES(?, ?)` over `data` in order.
pub fn insert_statement(table: &str, data: &Row) -> DbResult<Statement> {
    validate_identifier(table)?;
    for column in data.keys() {
        validate_identifier(column)?;
    }

    let columns: Vec<&str> = data.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        table,
        columns.join(", "),
        placeholders
    );

    Ok(Statement::new(sql, data.values().cloned().collect()))
}

/// Assemble `UPDATE <table> SET <c1> = ?, .. WHERE <pk> = ?`.
///
/// Every field in `data` is written (the key column included); the key value
/// is appended as the last parameter.
pub fn update_statement(
    table: &str,
    primary_key: &str,
    key_value: &JsonValue,
    data: &Row,
) -> DbResult<Statement> {
    validate_identifier(table)?;
    validate_identifier(primary_key)?;
    if data.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Nothing to update in '{}': no known fields are set",
            table
        )));
    }

    let mut assignments = Vec::with_capacity(data.len());
    for column in data.keys() {
        validate_identifier(column)?;
        assignments.push(format!("{} = ?", column));
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        primary_key
    );
    let mut params: Vec<JsonValue> = data.values().cloned().collect();
    params.push(key_value.clone());

    Ok(Statement::new(sql, params))
}

/// Assemble `DELETE FROM <table> WHERE <pk> = ?`.
pub fn delete_statement(
    table: &str,
    primary_key: &str,
    key_value: &JsonValue,
) -> DbResult<Statement> {
    validate_identifier(table)?;
    validate_identifier(primary_key)?;
    Ok(Statement::new(
        format!("DELETE FROM {} WHERE {} = ?", table, primary_key),
        vec![key_value.clone()],
    ))
}
