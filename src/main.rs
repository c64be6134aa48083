//! Command-line interface for redshift-load
//!
//! # Usage Examples
//!
//! ## Load
//! ```bash
//! # Create a table and load a CSV file staged through S3
//! redshift-load load \
//!   --identifier jdbc:redshift://cluster.example.com:5439/dev \
//!   --input users.csv \
//!   --fields "id:int,name:varchar(64)" \
//!   --protocol-option tablename=users \
//!   --protocol-option s3outputpath=s3://bucket/stage
//!
//! # Merge into an existing table on its distribution key
//! redshift-load load --config users.toml --input s3://bucket/in/users.csv \
//!   --sink-mode UPDATE --format-option distributionkey=id
//! ```
//!
//! ## Compile
//! ```bash
//! # Print the statements a load would run without connecting
//! redshift-load compile --fields "id:int,name:varchar(64)" \
//!   --protocol-option tablename=users --format-option copyoptions.GZIP=
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use redshift_load::config::merge_pairs;
use redshift_load::core::properties::{JDBC_PASSWORD, JDBC_USER};
use redshift_load::core::{Fields, Properties, RecordSink, SinkMode};
use redshift_load::{
    ConnectorConfig, CsvSource, LoadPlan, RedshiftFactory, RedshiftOpts, RedshiftScheme,
    RedshiftTap,
};
use std::path::PathBuf;
use tracing::{info, warn};

const FORMAT_NAME: &str = "redshift";
const PROTOCOL_NAME: &str = "jdbc";

#[derive(Parser)]
#[command(name = "redshift-load")]
#[command(about = "Bulk-load CSV data into Amazon Redshift through staged COPY")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Clone)]
struct ConnectorArgs {
    /// Field declarations, e.g. "id:int,name:varchar(64)"
    #[arg(long, default_value = "")]
    fields: String,

    /// TOML file with [format] and [protocol] option tables
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Format option as key=value (repeatable, overrides the config file)
    #[arg(long = "format-option", value_name = "KEY=VALUE")]
    format_options: Vec<String>,

    /// Protocol option as key=value (repeatable, overrides the config file)
    #[arg(long = "protocol-option", value_name = "KEY=VALUE")]
    protocol_options: Vec<String>,

    /// Sink mode (CREATE, REPLACE, APPEND, UPDATE); the sinkmode option wins
    #[arg(long, default_value = "CREATE")]
    sink_mode: SinkMode,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage a CSV file and load it into Redshift
    Load {
        /// Warehouse connection options
        #[command(flatten)]
        warehouse: RedshiftOpts,

        #[command(flatten)]
        connector: ConnectorArgs,

        /// Input CSV file (local path or s3:// URI)
        #[arg(long)]
        input: String,

        /// Input delimiter
        #[arg(long, default_value = ",")]
        input_delimiter: char,

        /// The input has no header row
        #[arg(long)]
        no_headers: bool,

        /// Write a JSON load report to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Print the statements a load would run, without connecting
    Compile {
        #[command(flatten)]
        connector: ConnectorArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load {
            warehouse,
            connector,
            input,
            input_delimiter,
            no_headers,
            report,
        } => {
            run_load(
                warehouse,
                connector,
                input,
                input_delimiter,
                no_headers,
                report,
            )
            .await
        }
        Commands::Compile { connector } => run_compile(connector),
    }
}

/// Resolve properties and build the scheme and tap.
fn build_tap(
    connector: &ConnectorArgs,
    identifier: &str,
    extra_protocol: Properties,
) -> anyhow::Result<(Fields, RedshiftTap)> {
    let fields = Fields::parse_list(&connector.fields).map_err(anyhow::Error::msg)?;

    let file_config = match &connector.config {
        Some(path) => ConnectorConfig::from_file(path)?,
        None => ConnectorConfig::default(),
    };
    let format_properties = merge_pairs(file_config.format_properties(), &connector.format_options)?;
    let mut protocol_properties =
        merge_pairs(file_config.protocol_properties(), &connector.protocol_options)?;
    protocol_properties.extend(&extra_protocol);

    let factory = RedshiftFactory::new();
    let scheme: RedshiftScheme =
        factory.create_scheme(FORMAT_NAME, fields.clone(), &format_properties)?;
    let tap = factory.create_tap(
        PROTOCOL_NAME,
        scheme,
        identifier,
        connector.sink_mode,
        &protocol_properties,
    )?;
    Ok((fields, tap))
}

async fn run_load(
    warehouse: RedshiftOpts,
    connector: ConnectorArgs,
    input: String,
    input_delimiter: char,
    no_headers: bool,
    report_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut credentials = Properties::new();
    if let Some(user) = warehouse.user {
        credentials.insert(JDBC_USER, user);
    }
    if let Some(password) = warehouse.password {
        credentials.insert(JDBC_PASSWORD, password);
    }

    let (fields, tap) = build_tap(&connector, &warehouse.identifier, credentials)?;
    let delimiter =
        u8::try_from(input_delimiter).context("Input delimiter must be an ASCII character")?;
    let source = CsvSource::new(input, fields)
        .with_delimiter(delimiter)
        .with_headers(!no_headers);

    let cancel = tap.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling load");
            cancel.cancel();
        }
    });

    let report = tap.consume_records(&source).await?;
    info!(
        "Loaded {} rows into {} in {:.2}s",
        report.rows_loaded,
        report.table,
        report.duration_seconds()
    );
    for warning in &report.warnings {
        warn!("{warning}");
    }

    if let Some(path) = report_path {
        report.write_to_file(&path)?;
    }
    Ok(())
}

fn run_compile(connector: ConnectorArgs) -> anyhow::Result<()> {
    let (_, tap) = build_tap(&connector, "", Properties::new())?;
    let config = tap.load_config()?;
    let plan = LoadPlan::compile(&config)?;

    println!("-- table: {} ({} mode)", plan.table, plan.sink_mode);
    if let Some(drop) = &plan.drop {
        println!("{drop};");
    }
    if let Some(create) = &plan.create {
        println!("{create};");
    }
    if let Some(merge) = &plan.merge {
        println!("{};", merge.create_intermediate);
    }
    match &plan.copy {
        Some(copy) => println!("{copy};"),
        None => println!("-- rows are loaded with batched INSERT statements"),
    }
    if let Some(merge) = &plan.merge {
        for statement in &merge.merge {
            println!("{statement};");
        }
        println!("{};", merge.drop_intermediate);
    }
    Ok(())
}
