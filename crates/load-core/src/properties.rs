//! String-keyed configuration map and the keys this crate recognizes.
//!
//! Unknown keys are carried along and ignored, so host configuration can
//! contain settings for other components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target table name.
pub const TABLE_NAME: &str = "tablename";
/// Separator for list-valued properties.
pub const FIELD_SEPARATOR: &str = "separator";
/// Explicit column names.
pub const COLUMN_NAMES: &str = "columnnames";
/// Explicit column DDL types.
pub const COLUMN_DEFS: &str = "columndefs";
/// Redshift distribution key (also the merge key in UPDATE mode).
pub const DISTRIBUTION_KEY: &str = "distributionkey";
/// Redshift sort keys.
pub const SORT_KEYS: &str = "sortkeys";
/// Prefix for per-option COPY flags, e.g. `copyoptions.GZIP`.
pub const COPY_OPTIONS_PREFIX: &str = "copyoptions.";
/// Delimiter used when staging records.
pub const FIELD_DELIMITER: &str = "fielddelimiter";
/// Quote character used when staging records.
pub const QUOTE_CHARACTER: &str = "quotecharacter";
/// Base path (local directory or `s3://` prefix) for staged files.
pub const STAGING_OUTPUT_PATH: &str = "s3outputpath";
/// Explicit AWS access key.
pub const AWS_ACCESS_KEY: &str = "awsacceskey";
/// Explicit AWS secret key.
pub const AWS_SECRET_KEY: &str = "awssecretkey";
/// Keep staged files when a load fails.
pub const KEEP_DEBUG_DATA: &str = "keepdebughfsdata";
/// Insert rows with `INSERT` statements instead of staging + COPY.
pub const USE_DIRECT_INSERT: &str = "usedirectinsert";
/// Override of the caller-supplied sink mode.
pub const SINK_MODE: &str = "sinkmode";
/// Warehouse user.
pub const JDBC_USER: &str = "jdbcuser";
/// Warehouse password.
pub const JDBC_PASSWORD: &str = "jdbcpassword";

/// Default list separator.
pub const DEFAULT_SEPARATOR: &str = ",";

/// Ordered string-keyed option map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Value for `key`, treating blank values as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse a boolean flag. Anything other than a case-insensitive `true`
    /// is false; a missing key yields `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge `other` into `self`; keys in `other` win.
    pub fn extend(&mut self, other: &Properties) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a `key=value` pair as given on the command line.
    pub fn parse_pair(pair: &str) -> Result<(String, String), String> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid option '{pair}', expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid option '{pair}', key is empty"));
        }
        Ok((key.to_string(), value.to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

/// Split a list-valued property, trimming entries and dropping empty ones.
pub fn split_list(value: &str, separator: &str) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
