//! Capabilities the loader needs from the outside world.
//!
//! The warehouse and staging store are external collaborators; the loader
//! only depends on these traits so it can be driven against Redshift and S3
//! in production and in-memory fakes in tests.

use crate::fields::Fields;
use crate::values::Record;
use anyhow::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A stream of records produced for one load attempt.
pub type RecordStream<'a> = BoxStream<'a, Result<Record>>;

/// Relational execution engine.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    /// Whether `table` (optionally schema-qualified) exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Execute one statement and return the number of rows affected.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Row count of `table`, when the engine can report one cheaply.
    async fn row_count(&self, _table: &str) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// Text staged for NULL values unless a `NULL AS` option says otherwise.
pub const DEFAULT_NULL_MARKER: &str = "\\N";

/// How records are encoded into staged files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFormat {
    pub delimiter: u8,
    /// CSV quote character. `None` writes fields unquoted, with the
    /// delimiter, line breaks and backslashes escaped by a backslash.
    pub quote: Option<u8>,
    /// Written in place of NULL values; must match the COPY `NULL AS` text.
    pub null_marker: String,
    pub gzip: bool,
}

impl Default for StageFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Some(b'"'),
            null_marker: DEFAULT_NULL_MARKER.to_string(),
            gzip: false,
        }
    }
}

/// Where a record stream was staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedLocation {
    /// Prefix handed to `COPY ... FROM`.
    pub uri: String,
    /// Every file written under `uri`.
    pub files: Vec<String>,
    pub rows: u64,
}

/// Durable object store for staged files.
#[async_trait::async_trait]
pub trait StagingStore: Send + Sync {
    /// Write `records` under `path` and return what was written.
    ///
    /// On error the store may have written some files already; callers are
    /// expected to call [`StagingStore::delete_prefix`] on `path`.
    async fn write(
        &self,
        path: &str,
        format: &StageFormat,
        records: RecordStream<'_>,
    ) -> Result<StagedLocation>;

    /// Delete a completed stage.
    async fn delete(&self, location: &StagedLocation) -> Result<()>;

    /// Delete whatever exists under `path`, complete or not.
    async fn delete_prefix(&self, path: &str) -> Result<()>;
}

/// Producer of records. Each call to `produce_records` starts a fresh
/// stream from the beginning.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Fields describing the records, when known.
    fn fields(&self) -> Fields {
        Fields::Unknown
    }

    async fn produce_records(&self) -> Result<RecordStream<'_>>;
}

/// Consumer of records.
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    type Outcome: Send;

    async fn consume_records(&self, source: &dyn RecordSource) -> Result<Self::Outcome>;
}
