//! Record Gateway Library
//!
//! A single gateway over one SQL database (SQLite, PostgreSQL, MySQL) and a
//! schema-driven generic record that reads and writes rows of any table
//! without per-table code.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod record;

pub use config::{Config, GatewayConfig};
pub use db::Gateway;
pub use error::{DbError, DbResult};
pub use record::{PostOutcome, Record, index_result_set};
