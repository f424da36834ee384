//! Record Gateway - Main entry point.
//!
//! A small command line front end over the library: describe a table, fetch,
//! list, save and delete records, or run a parameterized read. Results are
//! printed to stdout as JSON; logs go to stderr.

use record_gateway::config::{Command, Config};
use record_gateway::{DbResult, Gateway, PostOutcome, Record, index_result_set};
use serde_json::{Value as JsonValue, json};
use std::io;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(io::stderr),
            )
            .init();
    }
}

/// Command line values are JSON when they parse as JSON, plain strings otherwise.
fn parse_arg(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

async fn run(gateway: &Gateway, command: Command) -> DbResult<JsonValue> {
    match command {
        Command::Describe { table } => {
            let schema = gateway.fetch_table_schema(&table).await?;
            Ok(serde_json::to_value(schema)?)
        }
        Command::Fetch { table, id, field } => {
            let record = Record::fetch(gateway, &table, parse_arg(&id), &field).await?;
            Ok(record
                .map(|r| JsonValue::Object(r.into_data()))
                .unwrap_or(JsonValue::Null))
        }
        Command::List {
            table,
            ids,
            field,
            index_by,
        } => {
            let ids: Vec<JsonValue> = ids.iter().map(|id| parse_arg(id)).collect();
            let rows = Record::fetch_list(gateway, &table, ids, &field)
                .await?
                .into_iter()
                .map(Record::into_data);
            match index_by {
                Some(index_field) => Ok(serde_json::to_value(index_result_set(
                    rows,
                    &index_field,
                ))?),
                None => Ok(JsonValue::Array(rows.map(JsonValue::Object).collect())),
            }
        }
        Command::Query { sql, params } => {
            let params: Vec<JsonValue> = params.iter().map(|p| parse_arg(p)).collect();
            let rows = gateway.try_get_sql_array(&sql, &params).await?;
            Ok(serde_json::to_value(rows)?)
        }
        Command::Save { table, json } => {
            let data = serde_json::from_str(&json)?;
            let mut record = Record::with_data(gateway, &table, data).await?;
            let outcome = match record.post().await? {
                PostOutcome::Inserted(key) => json!({ "inserted": key }),
                PostOutcome::Updated(rows) => json!({ "updated": rows }),
            };
            Ok(json!({ "result": outcome, "record": record.data() }))
        }
        Command::Delete { table, id, field } => {
            let deleted = match Record::fetch(gateway, &table, parse_arg(&id), &field).await? {
                Some(mut record) => record.delete().await?,
                None => 0,
            };
            Ok(json!({ "deleted": deleted }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let gateway_config = config.gateway_config()?;
    info!(
        dsn = %gateway_config.masked_dsn(),
        "Starting record-gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let gateway = Gateway::connect(&gateway_config).await?;
    let result = run(&gateway, config.command).await;
    gateway.close().await;

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            Err(e.into())
        }
    }
}
