//! Staging stores for redshift-load
//!
//! Records are encoded into delimited part files and written under a run
//! directory before Redshift loads them with `COPY`.
//!
//! # Location Types
//!
//! - **Local**: a directory on the local filesystem
//! - **S3**: a prefix in an S3 bucket (`s3://bucket/prefix/`)
//!
//! Each load writes to its own run directory
//! `<base>/<table>/<timestamp>-<uuid>/` so concurrent or retried loads never
//! share files.

mod encoder;
mod input;
mod local;
mod s3;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use load_core::{Credentials, RecordStream, StageFormat, StagedLocation, StagingStore};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

pub use encoder::{part_file_name, PartEncoder, DEFAULT_PART_ROWS};
pub use input::open_input;
pub use local::LocalStage;
pub use s3::S3Stage;

/// A parsed staging location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePath {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl StagePath {
    /// `s3://bucket/key` is S3, everything else is a local path.
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.starts_with("s3://") {
            let (bucket, key) = parse_s3_uri(uri)?;
            Ok(StagePath::S3 { bucket, key })
        } else {
            Ok(StagePath::Local(PathBuf::from(uri)))
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, StagePath::S3 { .. })
    }

    pub fn display_name(&self) -> String {
        match self {
            StagePath::Local(path) => path.display().to_string(),
            StagePath::S3 { bucket, key } => format!("s3://{bucket}/{key}"),
        }
    }
}

/// Parse `s3://bucket/key`. The key may be empty (`s3://bucket/`).
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .context("S3 URI must start with 's3://'")?;

    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        anyhow::bail!("S3 URI is missing a bucket: '{uri}'");
    }
    Ok((bucket.to_string(), key.to_string()))
}

/// Run directory for one load: `<base>/<table>/<timestamp>-<id>/`.
pub fn run_path(base: &str, table: &str, at: DateTime<Utc>, id: Uuid) -> String {
    let table = table.replace(['/', '"'], "_");
    format!(
        "{}/{}/{}-{}/",
        base.trim_end_matches('/'),
        table,
        at.format("%Y%m%dT%H%M%S"),
        id.simple()
    )
}

/// Run directory with the current time and a fresh id.
pub fn new_run_path(base: &str, table: &str) -> String {
    run_path(base, table, Utc::now(), Uuid::new_v4())
}

/// Staging store selected from the base path's scheme.
pub enum Stage {
    Local(LocalStage),
    S3(S3Stage),
}

impl Stage {
    /// Local paths need no setup. S3 writes with `credentials`, falling
    /// back to the ambient AWS configuration when they are runtime-determined.
    pub async fn for_base_path(base: &str, credentials: &Credentials) -> Result<Self> {
        let path = StagePath::parse(base)?;
        info!("Staging under {}", path.display_name());
        if path.is_s3() {
            Ok(Stage::S3(S3Stage::new(credentials).await?))
        } else {
            Ok(Stage::Local(LocalStage::new()))
        }
    }
}

#[async_trait::async_trait]
impl StagingStore for Stage {
    async fn write(
        &self,
        path: &str,
        format: &StageFormat,
        records: RecordStream<'_>,
    ) -> Result<StagedLocation> {
        match self {
            Stage::Local(stage) => stage.write(path, format, records).await,
            Stage::S3(stage) => stage.write(path, format, records).await,
        }
    }

    async fn delete(&self, location: &StagedLocation) -> Result<()> {
        match self {
            Stage::Local(stage) => stage.delete(location).await,
            Stage::S3(stage) => stage.delete(location).await,
        }
    }

    async fn delete_prefix(&self, path: &str) -> Result<()> {
        match self {
            Stage::Local(stage) => stage.delete_prefix(path).await,
            Stage::S3(stage) => stage.delete_prefix(path).await,
        }
    }
}
