//! Redshift bulk loader
//!
//! Stages a record stream as delimited files and loads it into an Amazon
//! Redshift table with `COPY`.
//!
//! # Features
//!
//! - Sink modes: CREATE, REPLACE, APPEND and UPDATE (merge on the
//!   distribution key)
//! - Credential resolution: explicit keys, then `AWS_ACCESS_KEY` /
//!   `AWS_SECRET_KEY`, then the cluster's default IAM role
//! - Local or S3 staging with optional gzip and rolling part files
//! - Direct insert mode for small loads
//!
//! # CLI Usage
//!
//! ```bash
//! # Load a CSV file into a new table
//! redshift-load load \
//!   --identifier jdbc:redshift://cluster:5439/dev \
//!   --input users.csv --fields "id:int,name:varchar(64)" \
//!   --protocol-option tablename=users \
//!   --protocol-option s3outputpath=s3://bucket/stage
//!
//! # Print the statements a load would run
//! redshift-load compile --fields "id:int,name:varchar(64)" \
//!   --protocol-option tablename=users
//! ```

use clap::Parser;

pub mod config;
pub mod factory;
pub mod load;
pub mod source;

pub use config::ConnectorConfig;
pub use factory::{RedshiftFactory, RedshiftScheme, RedshiftTap};
pub use load::{LoadConfig, LoadPlan, LoadReport, Loader};
pub use source::CsvSource;

// Re-export the core crates for convenience
pub use load_core as core;
pub use redshift_load_stage as stage;
pub use redshift_load_warehouse as warehouse;

#[derive(Parser, Clone)]
pub struct RedshiftOpts {
    /// Warehouse identifier (jdbc:redshift://host:port/db or postgresql://...)
    #[arg(long, env = "REDSHIFT_IDENTIFIER")]
    pub identifier: String,

    /// Warehouse user (overrides the jdbcuser option)
    #[arg(long, env = "REDSHIFT_USER")]
    pub user: Option<String>,

    /// Warehouse password (overrides the jdbcpassword option)
    #[arg(long, env = "REDSHIFT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}
