//! Sink mode policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy for reconciling a pre-existing target table with an incoming load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SinkMode {
    /// Table must not exist; it is created.
    Create,
    /// Existing table is dropped and recreated.
    Replace,
    /// Table must exist; rows are appended.
    Append,
    /// Table must exist; rows are merged on the distribution key.
    Update,
}

impl SinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkMode::Create => "CREATE",
            SinkMode::Replace => "REPLACE",
            SinkMode::Append => "APPEND",
            SinkMode::Update => "UPDATE",
        }
    }

    /// Whether the target table must already exist.
    pub fn requires_existing_table(&self) -> bool {
        matches!(self, SinkMode::Append | SinkMode::Update)
    }
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(SinkMode::Create),
            "REPLACE" => Ok(SinkMode::Replace),
            "APPEND" => Ok(SinkMode::Append),
            "UPDATE" => Ok(SinkMode::Update),
            other => Err(format!(
                "Unknown sink mode '{other}', expected one of CREATE, REPLACE, APPEND, UPDATE"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("replace".parse::<SinkMode>().unwrap(), SinkMode::Replace);
        assert_eq!(" UPDATE ".parse::<SinkMode>().unwrap(), SinkMode::Update);
        assert!("KEEP".parse::<SinkMode>().is_err());
    }

    #[test]
    fn test_requires_existing_table() {
        assert!(!SinkMode::Create.requires_existing_table());
        assert!(!SinkMode::Replace.requires_existing_table());
        assert!(SinkMode::Append.requires_existing_table());
        assert!(SinkMode::Update.requires_existing_table());
    }
}
