//! Connector factory.
//!
//! Builds a [`RedshiftScheme`] (format side: delimiter, quoting, COPY
//! options, table layout) and a [`RedshiftTap`] (protocol side: warehouse
//! identity, staging location, credentials, sink mode) from string options.
//! Construction performs no I/O.

use crate::load::{LoadConfig, LoadReport, Loader};
use anyhow::Context;
use load_core::credentials::{ENV_AWS_ACCESS_KEY, ENV_AWS_SECRET_KEY};
use load_core::properties::{
    AWS_ACCESS_KEY, AWS_SECRET_KEY, FIELD_DELIMITER, JDBC_PASSWORD, JDBC_USER, KEEP_DEBUG_DATA,
    QUOTE_CHARACTER, SINK_MODE, STAGING_OUTPUT_PATH, USE_DIRECT_INSERT,
};
use load_core::{
    CopyOption, CopyOptionSet, Credentials, Fields, LoadError, LoadObserver, Properties,
    RecordSink, RecordSource, Result, SinkMode, StageFormat, TableDesc, TracingObserver,
    DEFAULT_NULL_MARKER,
};
use redshift_load_stage::Stage;
use redshift_load_warehouse::{connection_config, RedshiftWarehouse};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Field delimiter used when `fielddelimiter` is not set.
pub const DEFAULT_DELIMITER: &str = ",";
/// Quote character used when `quotecharacter` is not set.
pub const DEFAULT_QUOTE: &str = "\"";
/// Staging base used when `s3outputpath` is not set.
pub const DEFAULT_STAGING_PATH: &str = "/tmp";
/// Direct insert is opt-in; loads stage files and COPY them unless
/// `usedirectinsert` is set.
pub const DEFAULT_USE_DIRECT_INSERT: bool = false;

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Creates schemes and taps from string options.
#[derive(Clone)]
pub struct RedshiftFactory {
    env: Arc<EnvLookup>,
}

impl RedshiftFactory {
    /// A factory reading fallback credentials from the process environment.
    pub fn new() -> Self {
        Self::with_env(|key| std::env::var(key).ok())
    }

    /// A factory with an injected environment lookup.
    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env: Arc::new(lookup),
        }
    }

    pub fn description(&self) -> &'static str {
        "RedshiftFactory"
    }

    /// Build the format side of a connector.
    ///
    /// The table name is optional here; it is required by [`Self::create_tap`].
    pub fn create_scheme(
        &self,
        format: &str,
        fields: Fields,
        format_properties: &Properties,
    ) -> Result<RedshiftScheme> {
        info!(
            "Creating RedshiftScheme for format {} with fields {:?}",
            format,
            fields.names()
        );

        let delimiter = format_properties
            .get(FIELD_DELIMITER)
            .unwrap_or(DEFAULT_DELIMITER)
            .to_string();
        let quote = format_properties
            .get(QUOTE_CHARACTER)
            .unwrap_or(DEFAULT_QUOTE)
            .to_string();

        let desc = TableDesc::build(&fields, format_properties, false)?;
        let copy_options = CopyOptionSet::from_properties(format_properties);

        let scheme = RedshiftScheme {
            fields,
            desc,
            delimiter,
            quote,
            copy_options,
        };
        scheme.stage_format()?;
        Ok(scheme)
    }

    /// Build the protocol side of a connector around `scheme`.
    ///
    /// When the table descriptor built from `protocol_properties` is
    /// incomplete and the scheme's sink fields are typed, columns and types
    /// are filled from the sink fields and the scheme's columns follow.
    pub fn create_tap(
        &self,
        protocol: &str,
        mut scheme: RedshiftScheme,
        identifier: &str,
        sink_mode: SinkMode,
        protocol_properties: &Properties,
    ) -> Result<RedshiftTap> {
        info!(
            "Creating RedshiftTap for protocol {} in {} mode",
            protocol, sink_mode
        );

        let user = protocol_properties
            .get_non_empty(JDBC_USER)
            .map(str::to_string);
        let password = protocol_properties
            .get_non_empty(JDBC_PASSWORD)
            .map(|p| SecretString::from(p.to_string()));
        let staging_base = protocol_properties
            .get_or(STAGING_OUTPUT_PATH, DEFAULT_STAGING_PATH)
            .to_string();

        let env_access = (self.env)(ENV_AWS_ACCESS_KEY);
        let env_secret = (self.env)(ENV_AWS_SECRET_KEY);
        let credentials = Credentials::resolve(
            protocol_properties.get(AWS_ACCESS_KEY),
            protocol_properties.get(AWS_SECRET_KEY),
            env_access.as_deref(),
            env_secret.as_deref(),
        );
        debug!("Resolved credentials: {:?}", credentials);

        let keep_debug_data = protocol_properties.get_bool(KEEP_DEBUG_DATA, false);
        let use_direct_insert =
            protocol_properties.get_bool(USE_DIRECT_INSERT, DEFAULT_USE_DIRECT_INSERT);

        let mut desc = TableDesc::build(scheme.source_fields(), protocol_properties, true)?;
        desc.inherit_layout(&scheme.desc);

        let sink_fields = scheme.sink_fields();
        if !desc.has_required_table_information() && sink_fields.has_types() {
            debug!(
                "Table description incomplete, falling back to sink fields {:?}",
                sink_fields.names()
            );
            desc.complete_from_fields(sink_fields);
            scheme.set_columns(desc.columns.clone());
        }

        let sink_mode = match protocol_properties.get_non_empty(SINK_MODE) {
            Some(mode) => mode.parse().map_err(LoadError::Configuration)?,
            None => sink_mode,
        };

        Ok(RedshiftTap {
            identifier: identifier.to_string(),
            user,
            password,
            staging_base,
            credentials,
            desc,
            scheme,
            sink_mode,
            keep_debug_data,
            use_direct_insert,
            cancel: CancellationToken::new(),
            observer: Arc::new(TracingObserver),
        })
    }
}

impl Default for RedshiftFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Format side of a connector.
#[derive(Debug, Clone)]
pub struct RedshiftScheme {
    fields: Fields,
    desc: TableDesc,
    delimiter: String,
    quote: String,
    copy_options: CopyOptionSet,
}

impl RedshiftScheme {
    pub fn source_fields(&self) -> &Fields {
        &self.fields
    }

    pub fn sink_fields(&self) -> &Fields {
        &self.fields
    }

    /// Format-level table descriptor (name optional).
    pub fn table_desc(&self) -> &TableDesc {
        &self.desc
    }

    pub fn columns(&self) -> &[String] {
        &self.desc.columns
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.desc.columns = columns;
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// COPY options exactly as configured.
    pub fn copy_options(&self) -> &CopyOptionSet {
        &self.copy_options
    }

    /// COPY options with the file format filled in: unless DELIMITER,
    /// FIXEDWIDTH or CSV is configured, `DELIMITER '<delimiter>'` and
    /// `CSV QUOTE '<quote>'` are added. Without CSV, ESCAPE is added so
    /// backslash-escaped fields read back intact. A NULL option without an
    /// argument, or none at all, becomes `NULL '\N'`.
    pub fn effective_copy_options(&self) -> CopyOptionSet {
        let mut options = self.copy_options.clone();
        let has_format = [CopyOption::DELIMITER, CopyOption::FIXEDWIDTH, CopyOption::CSV]
            .into_iter()
            .any(|option| options.contains(option));
        if !has_format {
            options.insert(CopyOption::DELIMITER, Some(self.delimiter.clone()));
            if !self.quote.is_empty() {
                options.insert(CopyOption::CSV, Some(self.quote.clone()));
            }
        }
        if !options.contains(CopyOption::CSV) && !options.contains(CopyOption::FIXEDWIDTH) {
            options.insert(CopyOption::ESCAPE, None);
        }
        if options.get(CopyOption::NULL).flatten().is_none() {
            options.insert(CopyOption::NULL, Some(DEFAULT_NULL_MARKER.to_string()));
        }
        options
    }

    /// How staged files are encoded so that the effective COPY options can
    /// read them back.
    pub fn stage_format(&self) -> Result<StageFormat> {
        let options = self.effective_copy_options();
        for unsupported in [CopyOption::FIXEDWIDTH, CopyOption::LZOP] {
            if options.contains(unsupported) {
                return Err(LoadError::Configuration(format!(
                    "{unsupported} is not supported for staged loads"
                )));
            }
        }

        let delimiter = options
            .get(CopyOption::DELIMITER)
            .flatten()
            .unwrap_or(&self.delimiter);
        let delimiter = single_byte(delimiter, FIELD_DELIMITER)?;

        let quote = match options.get(CopyOption::CSV) {
            Some(Some(quote)) => Some(single_byte(quote, QUOTE_CHARACTER)?),
            Some(None) => Some(b'"'),
            None => None,
        };
        let null_marker = options
            .get(CopyOption::NULL)
            .flatten()
            .unwrap_or(DEFAULT_NULL_MARKER)
            .to_string();

        Ok(StageFormat {
            delimiter,
            quote,
            null_marker,
            gzip: options.expects_gzip(),
        })
    }
}

fn single_byte(value: &str, key: &str) -> Result<u8> {
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(LoadError::Configuration(format!(
            "{key} must be a single ASCII character, got '{value}'"
        ))),
    }
}

/// Protocol side of a connector: a sink loading records into one table.
pub struct RedshiftTap {
    identifier: String,
    user: Option<String>,
    password: Option<SecretString>,
    staging_base: String,
    credentials: Credentials,
    desc: TableDesc,
    scheme: RedshiftScheme,
    sink_mode: SinkMode,
    keep_debug_data: bool,
    use_direct_insert: bool,
    cancel: CancellationToken,
    observer: Arc<dyn LoadObserver>,
}

impl RedshiftTap {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn staging_base(&self) -> &str {
        &self.staging_base
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn table_desc(&self) -> &TableDesc {
        &self.desc
    }

    pub fn scheme(&self) -> &RedshiftScheme {
        &self.scheme
    }

    pub fn sink_mode(&self) -> SinkMode {
        self.sink_mode
    }

    pub fn keep_debug_data(&self) -> bool {
        self.keep_debug_data
    }

    pub fn use_direct_insert(&self) -> bool {
        self.use_direct_insert
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that cancels a load that is still staging.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve everything a load needs. Performs no I/O.
    pub fn load_config(&self) -> Result<LoadConfig> {
        let mut config = LoadConfig::new(
            self.desc.clone(),
            self.sink_mode,
            self.staging_base.clone(),
        );
        config.copy_options = self.scheme.effective_copy_options();
        config.stage_format = self.scheme.stage_format()?;
        config.credentials = self.credentials.clone();
        config.keep_debug_data = self.keep_debug_data;
        config.use_direct_insert = self.use_direct_insert;
        Ok(config)
    }

    /// Connection settings for the warehouse identifier.
    pub fn connection_config(&self) -> anyhow::Result<tokio_postgres::Config> {
        connection_config(
            &self.identifier,
            self.user.as_deref(),
            self.password.as_ref().map(|p| p.expose_secret()),
        )
    }
}

impl fmt::Debug for RedshiftTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedshiftTap")
            .field("identifier", &self.identifier)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("staging_base", &self.staging_base)
            .field("credentials", &self.credentials)
            .field("desc", &self.desc)
            .field("sink_mode", &self.sink_mode)
            .field("keep_debug_data", &self.keep_debug_data)
            .field("use_direct_insert", &self.use_direct_insert)
            .finish()
    }
}

#[async_trait::async_trait]
impl RecordSink for RedshiftTap {
    type Outcome = LoadReport;

    /// Connect to the warehouse and staging store, then run one load.
    async fn consume_records(&self, source: &dyn RecordSource) -> anyhow::Result<LoadReport> {
        let config = self.load_config()?;
        let warehouse = RedshiftWarehouse::connect(&self.connection_config()?).await?;
        let stage = Stage::for_base_path(&self.staging_base, &self.credentials)
            .await
            .with_context(|| format!("Failed to open staging store {}", self.staging_base))?;

        let report = Loader::new(&warehouse, &stage)
            .with_observer(self.observer.as_ref())
            .with_cancellation(self.cancel.clone())
            .run(&config, source)
            .await?;
        Ok(report)
    }
}
