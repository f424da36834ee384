//! Configuration handling for the record gateway.
//!
//! Connection settings come from a JSON file (`config.json` by default) holding
//! a DSN template, credentials, optional pool options and any number of extra
//! keys that fill `{{key}}` placeholders in the DSN. The binary layers CLI
//! arguments and environment variables on top via [`Config`].

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

const MASK: &str = "****";

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    ///
    /// Never exceeds the effective maximum, so a SQLite pool with no explicit
    /// settings stays at one connection.
    pub fn min_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.min_connections
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
            .min(self.max_connections_or_default(is_sqlite))
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error if invalid.
    pub fn validate(&self) -> DbResult<()> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err(DbError::config("max_connections must be greater than 0"));
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err(DbError::config("min_connections must be greater than 0"));
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(DbError::config(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Gateway connection settings.
///
/// ```json
/// {
///   "DSN": "mysql://{{host}}:3306/{{dbname}}",
///   "user": "app",
///   "password": "secret",
///   "host": "db.internal",
///   "dbname": "shop"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// DSN template (sensitive once rendered - log [`GatewayConfig::masked_dsn`] instead).
    #[serde(rename = "DSN", alias = "dsn")]
    pub dsn: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pool: PoolOptions,
    /// Every other key, available as a `{{key}}` template variable.
    #[serde(flatten)]
    pub vars: BTreeMap<String, JsonValue>,
}

impl GatewayConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            user: None,
            password: None,
            pool: PoolOptions::default(),
            vars: BTreeMap::new(),
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn from_json_str(json: &str) -> DbResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbError::config(format!("Invalid configuration: {}", e)))?;
        config.pool.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::config(format!(
                "Cannot read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Substitute every `{{key}}` in the DSN template.
    ///
    /// Replacement is literal: strings are inserted verbatim, other JSON values
    /// through their textual form. `user` and `password` are variables too.
    /// Placeholders without a value stay in place.
    pub fn render_dsn(&self) -> String {
        let mut dsn = self.dsn.clone();
        for (key, value) in &self.vars {
            let text = match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            dsn = dsn.replace(&format!("{{{{{}}}}}", key), &text);
        }
        if let Some(user) = &self.user {
            dsn = dsn.replace("{{user}}", user);
        }
        if let Some(password) = &self.password {
            dsn = dsn.replace("{{password}}", password);
        }
        dsn
    }

    /// Rendered DSN with any password replaced by `****`, safe for logs.
    pub fn masked_dsn(&self) -> String {
        let rendered = self.render_dsn();
        let mut masked = match Url::parse(&rendered) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some(MASK));
                url.to_string()
            }
            _ => rendered,
        };
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            masked = masked.replace(password, MASK);
        }
        masked
    }

    /// Backend selected by the rendered DSN's scheme.
    pub fn database_type(&self) -> DbResult<DatabaseType> {
        let rendered = self.render_dsn();
        DatabaseType::from_connection_string(&rendered).ok_or_else(|| {
            DbError::connection(
                format!("Unsupported DSN scheme in '{}'", self.masked_dsn()),
                "Use a mysql://, mariadb://, postgres:// or sqlite: URL",
            )
        })
    }
}

/// Command-line configuration for the `record-gateway` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "record-gateway",
    about = "Inspect and edit rows of any table through a schema-driven record layer",
    version,
    author
)]
pub struct Config {
    /// Path to the JSON configuration file
    #[arg(
        short,
        long,
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH,
        env = "RECORD_GATEWAY_CONFIG"
    )]
    pub config: PathBuf,

    /// DSN template overriding the file's "DSN" key
    #[arg(long, value_name = "DSN", env = "RECORD_GATEWAY_DSN")]
    pub dsn: Option<String>,

    /// Database user overriding the file's "user" key
    #[arg(long, env = "RECORD_GATEWAY_USER")]
    pub user: Option<String>,

    /// Database password overriding the file's "password" key
    #[arg(long, env = "RECORD_GATEWAY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "RECORD_GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "RECORD_GATEWAY_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the binary. Every command prints JSON to stdout.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print a table's columns, data types and primary key
    Describe { table: String },

    /// Fetch one row by key
    Fetch {
        table: String,
        id: String,
        /// Column to match
        #[arg(long, default_value = crate::models::DEFAULT_ID_FIELD)]
        field: String,
    },

    /// Fetch every row matching any of the given keys
    List {
        table: String,
        ids: Vec<String>,
        /// Column to match
        #[arg(long, default_value = crate::models::DEFAULT_ID_FIELD)]
        field: String,
        /// Print an object keyed by this column instead of an array
        #[arg(long)]
        index_by: Option<String>,
    },

    /// Run a read-only statement with positional parameters
    Query {
        sql: String,
        /// Parameter values, bound in order (parsed as JSON when possible)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Insert or update a row from a JSON object
    Save { table: String, json: String },

    /// Delete one row by key
    Delete {
        table: String,
        id: String,
        /// Column to match
        #[arg(long, default_value = crate::models::DEFAULT_ID_FIELD)]
        field: String,
    },
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the gateway configuration, applying CLI overrides.
    ///
    /// A missing file is only acceptable when `--dsn` supplies the template.
    pub fn gateway_config(&self) -> DbResult<GatewayConfig> {
        let mut config = if self.config.exists() || self.dsn.is_none() {
            GatewayConfig::from_file(&self.config)?
        } else {
            GatewayConfig::new(String::new())
        };

        if let Some(dsn) = &self.dsn {
            config.dsn = dsn.clone();
        }
        if let Some(user) = &self.user {
            config.user = Some(user.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        Ok(config)
    }
}
