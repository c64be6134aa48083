//! Local filesystem staging store

use crate::encoder::{write_parts, PartWriter, DEFAULT_PART_ROWS};
use anyhow::{Context, Result};
use load_core::{RecordStream, StageFormat, StagedLocation, StagingStore};
use std::path::Path;
use tracing::debug;

/// Stages part files into a local directory.
///
/// Redshift cannot read local files; this store serves development runs and
/// clusters that mount the staging directory.
#[derive(Debug, Clone)]
pub struct LocalStage {
    part_rows: usize,
}

impl LocalStage {
    pub fn new() -> Self {
        Self {
            part_rows: DEFAULT_PART_ROWS,
        }
    }

    pub fn with_part_rows(mut self, part_rows: usize) -> Self {
        self.part_rows = part_rows;
        self
    }
}

impl Default for LocalStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PartWriter for LocalStage {
    async fn put_part(&self, dir: &str, name: &str, data: Vec<u8>) -> Result<String> {
        let path = Path::new(dir).join(name);
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write staged file: {}", path.display()))?;
        Ok(path.display().to_string())
    }
}

#[async_trait::async_trait]
impl StagingStore for LocalStage {
    async fn write(
        &self,
        path: &str,
        format: &StageFormat,
        records: RecordStream<'_>,
    ) -> Result<StagedLocation> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create staging directory: {path}"))?;

        let (files, rows) = write_parts(self, path, format, self.part_rows, records).await?;
        Ok(StagedLocation {
            uri: path.to_string(),
            files,
            rows,
        })
    }

    async fn delete(&self, location: &StagedLocation) -> Result<()> {
        for file in &location.files {
            match tokio::fs::remove_file(file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to delete staged file: {file}"))
                }
            }
        }
        self.delete_prefix(&location.uri).await
    }

    async fn delete_prefix(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!("Removed staging directory: {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove staging directory: {path}")),
        }
    }
}
