//! Core types for redshift-load
//!
//! Everything needed to describe a Redshift bulk load without performing
//! any I/O: the table shape, the COPY option vocabulary, credentials, and
//! the compiler that renders them into SQL text.
//!
//! # Architecture
//!
//! - [`TableDesc`] is assembled from string properties and the producer's
//!   [`Fields`]
//! - [`CopyOptionSet`] holds the selected COPY options in canonical order
//! - [`Credentials`] resolves the access principal from configuration and
//!   the environment
//! - [`compile`] renders the above into a [`CopyCommand`]
//!
//! The [`Warehouse`], [`StagingStore`], [`RecordSource`] and [`RecordSink`]
//! traits are implemented by the I/O crates and the loader.

pub mod capability;
pub mod compile;
pub mod copy_option;
pub mod credentials;
mod error;
pub mod fields;
mod observer;
pub mod properties;
mod sink_mode;
pub mod table_desc;
pub mod values;

// Re-export error types
pub use error::{BoxError, CompileError, LoadError, Result};

// Re-export model types
pub use copy_option::{CopyOption, CopyOptionSet, RenderShape};
pub use credentials::{CredentialSource, Credentials};
pub use fields::{Field, FieldType, Fields};
pub use properties::Properties;
pub use sink_mode::SinkMode;
pub use table_desc::TableDesc;
pub use values::{FieldValue, Record};

// Re-export compiler entry points
pub use compile::{compile, quote_ident, CopyCommand};

// Re-export capability traits
pub use capability::{
    RecordSink, RecordSource, RecordStream, StageFormat, StagedLocation, StagingStore, Warehouse,
    DEFAULT_NULL_MARKER,
};

// Re-export observation types
pub use observer::{LoadObserver, LoadState, TracingObserver};
