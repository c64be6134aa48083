//! Error taxonomy for load operations.
//!
//! Configuration and compile errors are raised before any warehouse I/O.
//! Staging errors abort before any table-state decision. Table-state and
//! execution errors abort the current load after staging.

use crate::sink_mode::SinkMode;
use thiserror::Error;

/// Boxed underlying error carried by I/O failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while preparing or running a load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Missing or malformed configuration (e.g. no table name).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The target table's existence conflicts with the requested sink mode.
    #[error("Table '{table}' cannot be loaded in {mode} mode: {reason}")]
    TableState {
        table: String,
        mode: SinkMode,
        reason: String,
    },

    /// The table descriptor is incomplete or inconsistent at render time.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A statement failed against the warehouse.
    #[error("Execution of {statement} failed")]
    Execution {
        statement: &'static str,
        #[source]
        source: BoxError,
    },

    /// Writing to the staging store failed.
    #[error("Staging to '{base_path}' failed")]
    Staging {
        base_path: String,
        #[source]
        source: BoxError,
    },

    /// The load was cancelled before any load command was issued.
    #[error("Load cancelled during {0}")]
    Cancelled(&'static str),
}

impl LoadError {
    /// Wrap a warehouse failure for the given statement kind.
    pub fn execution(statement: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Execution {
            statement,
            source: source.into(),
        }
    }

    /// Wrap a staging store failure.
    pub fn staging(base_path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Staging {
            base_path: base_path.into(),
            source: source.into(),
        }
    }

    /// Whether this error was raised before any warehouse I/O took place.
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Compile(_))
    }
}

/// Reasons a table descriptor cannot be rendered into a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("table descriptor has no table name")]
    MissingTableName,

    #[error("table descriptor for '{0}' has no columns")]
    MissingColumns(String),

    #[error("column '{column}' of table '{table}' has no declared type")]
    MissingColumnType { table: String, column: String },

    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("{kind} '{key}' is not a column of table '{table}'")]
    UnknownKeyColumn {
        table: String,
        kind: &'static str,
        key: String,
    },

    #[error("table '{0}' has no distribution key to merge on")]
    MissingMergeKey(String),
}

/// Result type alias for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;
