//! Data models for the record gateway.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod filter;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::DatabaseType;
pub use filter::{
    Combinator, DEFAULT_FIELDS, DEFAULT_ID_FIELD, FetchOptions, Filter, ValueList,
};
pub use query::{QueryParam, Row, Statement};
pub use schema::{ColumnDefinition, TableMeta, TableSchema};
