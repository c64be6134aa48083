//! Record values.
//!
//! Records are ordered tuples positionally aligned with the table's column
//! list. Values render to delimited text for staging and to SQL literals for
//! direct inserts.

use crate::copy_option::quote_literal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single value in a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

/// Timestamp format Redshift's COPY accepts with its default TIMEFORMAT.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Text form written into staged files; `None` for SQL NULL.
    pub fn to_delimited(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    /// SQL literal for an `INSERT ... VALUES` list.
    pub fn to_sql_literal(&self) -> String {
        match self {
            FieldValue::Null => "NULL".to_string(),
            FieldValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) if f.is_finite() => f.to_string(),
            FieldValue::Float(f) => format!("'{f}'"),
            FieldValue::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
            FieldValue::Text(s) => format!("'{}'", quote_literal(s)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// One row of values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub values: Vec<FieldValue>,
}

impl Record {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<V: Into<FieldValue>> FromIterator<V> for Record {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Record::new(iter.into_iter().map(Into::into).collect())
    }
}
