//! Filter descriptors and select options.
//!
//! A [`Filter`] pairs a parameterized boolean SQL fragment with the value bound
//! to its placeholder. Lists of filters are joined with a [`Combinator`] into a
//! WHERE clause; an empty list means no WHERE clause at all.

use crate::error::{DbError, DbResult};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Default row-identifier column used by the record finders.
pub const DEFAULT_ID_FIELD: &str = "ID";

/// Default select list.
pub const DEFAULT_FIELDS: &str = "*";

/// A (fragment, bound value) pair such as `("name = ?", "Ana")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub query: String,
    #[serde(default)]
    pub param: JsonValue,
}

impl Filter {
    pub fn new(query: impl Into<String>, param: impl Into<JsonValue>) -> Self {
        Self {
            query: query.into(),
            param: param.into(),
        }
    }

    /// `field = ?` bound to `value`.
    pub fn equals(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::new(format!("{} = ?", field), value)
    }
}

/// Boolean operator joining filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl FromStr for Combinator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(DbError::invalid_input(format!(
                "Unknown combinator '{}', expected AND or OR",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Combinator {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Combinator> for String {
    fn from(value: Combinator) -> Self {
        value.as_sql().to_string()
    }
}

impl std::fmt::Display for Combinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One or many values for a single column.
///
/// A JSON array becomes one entry per element; any other value is a single
/// entry. `Vec<T>` converts element-wise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueList(Vec<JsonValue>);

impl ValueList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JsonValue> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<JsonValue> {
        self.0
    }
}

impl From<JsonValue> for ValueList {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Array(items) => Self(items),
            other => Self(vec![other]),
        }
    }
}

impl<T: Into<JsonValue>> From<Vec<T>> for ValueList {
    fn from(values: Vec<T>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl From<i64> for ValueList {
    fn from(value: i64) -> Self {
        Self(vec![value.into()])
    }
}

impl From<&str> for ValueList {
    fn from(value: &str) -> Self {
        Self(vec![value.into()])
    }
}

impl From<String> for ValueList {
    fn from(value: String) -> Self {
        Self(vec![value.into()])
    }
}

impl IntoIterator for ValueList {
    type Item = JsonValue;
    type IntoIter = std::vec::IntoIter<JsonValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Options object for [`Gateway::fetch_simple_data`](crate::db::Gateway::fetch_simple_data).
///
/// Deserializes from `{filter, orderby, limit, andOr, fields}`; every key is
/// optional and unrecognized keys are ignored. `limit` accepts a row count or
/// `false` (no limit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub filter: Vec<Filter>,
    pub orderby: Vec<String>,
    #[serde(deserialize_with = "deserialize_limit")]
    pub limit: Option<u64>,
    #[serde(rename = "andOr")]
    pub and_or: Combinator,
    pub fields: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            orderby: Vec::new(),
            limit: None,
            and_or: Combinator::And,
            fields: DEFAULT_FIELDS.to_string(),
        }
    }
}

impl FetchOptions {
    /// Build options from a JSON object.
    pub fn from_value(value: JsonValue) -> DbResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| DbError::invalid_input(format!("Invalid fetch options: {}", e)))
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filter.extend(filters);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.orderby.push(column.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn combinator(mut self, and_or: Combinator) -> Self {
        self.and_or = and_or;
        self
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LimitInput {
    Flag(bool),
    Count(u64),
    Text(String),
}

fn deserialize_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LimitInput>::deserialize(deserializer)? {
        None | Some(LimitInput::Flag(false)) => Ok(None),
        Some(LimitInput::Flag(true)) => Err(de::Error::custom(
            "limit must be a row count or false",
        )),
        Some(LimitInput::Count(n)) => Ok(Some(n)),
        Some(LimitInput::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid limit '{}'", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_options_defaults() {
        let opts = FetchOptions::from_value(json!({})).unwrap();
        assert!(opts.filter.is_empty());
        assert!(opts.orderby.is_empty());
        assert_eq!(opts.limit, None);
        assert_eq!(opts.and_or, Combinator::And);
        assert_eq!(opts.fields, "*");
        assert_eq!(opts, FetchOptions::default());
    }

    #[test]
    fn test_fetch_options_all_keys() {
        let opts = FetchOptions::from_value(json!({
            "filter": [{"query": "name = ?", "param": "Ana"}],
            "orderby": ["ID"],
            "limit": 10,
            "andOr": "or",
            "fields": "ID, name"
        }))
        .unwrap();
        assert_eq!(opts.filter, vec![Filter::new("name = ?", "Ana")]);
        assert_eq!(opts.orderby, vec!["ID".to_string()]);
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.and_or, Combinator::Or);
        assert_eq!(opts.fields, "ID, name");
    }

    #[test]
    fn test_fetch_options_ignores_unknown_keys() {
        let opts = FetchOptions::from_value(json!({"group": "x", "limit": false})).unwrap();
        assert_eq!(opts, FetchOptions::default());
    }

    #[test]
    fn test_fetch_options_limit_forms() {
        let opts = FetchOptions::from_value(json!({"limit": "25"})).unwrap();
        assert_eq!(opts.limit, Some(25));
        let opts = FetchOptions::from_value(json!({"limit": null})).unwrap();
        assert_eq!(opts.limit, None);
        assert!(FetchOptions::from_value(json!({"limit": true})).is_err());
        assert!(FetchOptions::from_value(json!({"limit": "ten"})).is_err());
    }

    #[test]
    fn test_fetch_options_rejects_unknown_combinator() {
        let err = FetchOptions::from_value(json!({"andOr": "XOR"})).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_combinator_round_trip_text() {
        assert_eq!("and".parse::<Combinator>().unwrap(), Combinator::And);
        assert_eq!(" OR ".parse::<Combinator>().unwrap(), Combinator::Or);
        assert_eq!(Combinator::Or.to_string(), "OR");
        assert_eq!(json!(Combinator::And), json!("AND"));
    }

    #[test]
    fn test_value_list_from_scalar_and_sequences() {
        assert_eq!(ValueList::from(5i64).len(), 1);
        assert_eq!(ValueList::from("a").into_inner(), vec![json!("a")]);
        assert_eq!(ValueList::from(vec![1i64, 2, 3]).len(), 3);
        assert_eq!(ValueList::from(json!([1, "b"])).len(), 2);
        assert_eq!(ValueList::from(json!(null)).into_inner(), vec![json!(null)]);
        assert!(ValueList::from(Vec::<i64>::new()).is_empty());
    }

    #[test]
    fn test_filter_equals() {
        let f = Filter::equals("ID", 3);
        assert_eq!(f.query, "ID = ?");
        assert_eq!(f.param, json!(3));
    }
}
