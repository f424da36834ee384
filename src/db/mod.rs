//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Statement execution and the transactional insert
//! - Schema introspection
//! - Type mappings from native column types to JSON
//! - SQL text builders

pub mod executor;
pub mod gateway;
pub mod params;
pub mod pool;
pub mod schema;
pub mod sql;
pub mod types;

pub use gateway::Gateway;
pub use pool::{DbPool, create_pool};
pub use schema::SchemaInspector;
pub use sql::{assemble_filter, delete_statement, insert_statement, select_statement, update_statement};
