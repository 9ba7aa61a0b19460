//! udata - run one command through the data-access helpers and print the
//! shaped result.

use clap::Parser;
use serde_json::Value as JsonValue;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use universal_data::config::{Config, Operation};
use universal_data::db::DataAccess;
use universal_data::format::{OutputFormat, format_value};
use universal_data::models::{ColumnMetadata, DataTable};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout only carries results
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: &Config, access: &DataAccess) -> Result<(), Box<dyn std::error::Error>> {
    let command = config.operation.args().to_command(config.timeout)?;
    debug!(command_type = %command.command_type, "Running command");

    match &config.operation {
        Operation::DataSet(_) => {
            let data_set = access.execute_data_set(&command).await?;
            for (i, table) in data_set.tables.iter().enumerate() {
                if config.format != OutputFormat::Json {
                    println!("-- result set {}", i + 1);
                }
                println!("{}", config.format.render(table));
            }
        }
        Operation::DataTable(_) => {
            let table = access.execute_data_table(&command).await?;
            println!("{}", config.format.render(&table));
        }
        Operation::Reader(_) => {
            let mut reader = access.execute_reader(&command).await?;
            while let Some(record) = reader.read().await? {
                let line: Vec<String> = record.values().iter().map(format_value).collect();
                println!("{}", line.join("\t"));
            }
            reader.close().await?;
        }
        Operation::Scalar(_) => {
            let value = access.execute_scalar(&command).await?;
            println!("{}", format_value(&value));
        }
        Operation::NonQuery(_) => {
            let rows_affected = access.execute_non_query(&command).await?;
            println!("{}", rows_affected);
        }
        Operation::OutputValues(_) => {
            let values = access.execute_output_values(&command).await?;
            let mut table = DataTable::new(vec![
                ColumnMetadata::new("parameter", "", false),
                ColumnMetadata::new("value", "", true),
            ]);
            table.rows = command
                .output_parameters()
                .zip(values)
                .map(|(p, v)| vec![JsonValue::from(p.bare_name().unwrap_or("")), v])
                .collect();
            println!("{}", config.format.render(&table));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let access = DataAccess::new(&config.database)?;
    let result = run(&config, &access).await;
    access.close().await;

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
