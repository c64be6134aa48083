//! Connector configuration files.
//!
//! A TOML file with a `[format]` and a `[protocol]` table. Values may be
//! strings, numbers or booleans; nested tables flatten into dotted keys so
//! COPY options can be grouped:
//!
//! ```toml
//! [format]
//! fielddelimiter = "|"
//!
//! [format.copyoptions]
//! GZIP = ""
//! MAXERROR = 10
//!
//! [protocol]
//! tablename = "users"
//! sinkmode = "REPLACE"
//! s3outputpath = "s3://bucket/stage"
//! ```

use anyhow::{Context, Result};
use load_core::Properties;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default)]
    format: BTreeMap<String, toml::Value>,
    #[serde(default)]
    protocol: BTreeMap<String, toml::Value>,
}

impl ConnectorConfig {
    /// Load a config from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn format_properties(&self) -> Properties {
        flatten(&self.format)
    }

    pub fn protocol_properties(&self) -> Properties {
        flatten(&self.protocol)
    }
}

fn flatten(table: &BTreeMap<String, toml::Value>) -> Properties {
    let mut properties = Properties::new();
    for (key, value) in table {
        flatten_value(key, value, &mut properties);
    }
    properties
}

fn flatten_value(key: &str, value: &toml::Value, properties: &mut Properties) {
    match value {
        toml::Value::String(s) => properties.insert(key, s.as_str()),
        toml::Value::Table(table) => {
            for (child, value) in table {
                flatten_value(&format!("{key}.{child}"), value, properties);
            }
        }
        other => properties.insert(key, other.to_string()),
    }
}

/// Merge `key=value` pairs over `base`; later pairs win.
pub fn merge_pairs(base: Properties, pairs: &[String]) -> Result<Properties> {
    let mut properties = base;
    for pair in pairs {
        let (key, value) = Properties::parse_pair(pair).map_err(anyhow::Error::msg)?;
        properties.insert(key, value);
    }
    Ok(properties)
}
