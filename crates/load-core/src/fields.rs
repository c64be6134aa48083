//! Field declarations supplied by the record producer.
//!
//! A field list is an ordered sequence of `(name, type)` pairs. The type is
//! optional, and the whole list may be one of two wildcard markers when the
//! producer does not know its shape up front.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column types understood when inferring a Redshift table shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Char { length: u32 },
    VarChar { length: u32 },
    Date,
    Timestamp,
    TimestampTz,
    /// Declared type passed through to DDL unchanged.
    Other(String),
}

/// VARCHAR length used when a string field has no declared length.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 256;

impl FieldType {
    /// Redshift DDL type for this field.
    pub fn to_ddl(&self) -> String {
        match self {
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::SmallInt => "SMALLINT".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Real => "REAL".to_string(),
            FieldType::Double => "DOUBLE PRECISION".to_string(),
            FieldType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            FieldType::Char { length } => format!("CHAR({length})"),
            FieldType::VarChar { length } => format!("VARCHAR({length})"),
            FieldType::Date => "DATE".to_string(),
            FieldType::Timestamp => "TIMESTAMP".to_string(),
            FieldType::TimestampTz => "TIMESTAMPTZ".to_string(),
            FieldType::Other(declared) => declared.clone(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ddl())
    }
}

impl FromStr for FieldType {
    type Err = String;

    /// Parse a declared type such as `int`, `varchar(64)` or `decimal(10,2)`.
    /// Unrecognized names are kept verbatim as [`FieldType::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let declared = s.trim();
        if declared.is_empty() {
            return Err("Empty field type".to_string());
        }

        let lower = declared.to_ascii_lowercase();
        let (base, args) = match lower.split_once('(') {
            Some((base, rest)) => {
                let args = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("Unbalanced parentheses in type: {declared}"))?;
                (base.trim(), Some(args))
            }
            None => (lower.as_str(), None),
        };

        let parse_u32 = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid type argument in: {declared}"))
        };

        let field_type = match (base, args) {
            ("bool" | "boolean", None) => FieldType::Boolean,
            ("smallint" | "int2" | "short", None) => FieldType::SmallInt,
            ("int" | "integer" | "int4", None) => FieldType::Integer,
            ("bigint" | "int8" | "long", None) => FieldType::BigInt,
            ("real" | "float4" | "float", None) => FieldType::Real,
            ("double" | "float8" | "double precision", None) => FieldType::Double,
            ("decimal" | "numeric", None) => FieldType::Decimal {
                precision: 18,
                scale: 0,
            },
            ("decimal" | "numeric", Some(args)) => {
                let (p, s) = args.split_once(',').unwrap_or((args, "0"));
                let precision = parse_u32(p)?;
                let scale = parse_u32(s)?;
                FieldType::Decimal {
                    precision: u8::try_from(precision)
                        .map_err(|_| format!("Decimal precision too large in: {declared}"))?,
                    scale: u8::try_from(scale)
                        .map_err(|_| format!("Decimal scale too large in: {declared}"))?,
                }
            }
            ("char" | "character", None) => FieldType::Char { length: 1 },
            ("char" | "character", Some(len)) => FieldType::Char {
                length: parse_u32(len)?,
            },
            ("varchar" | "string" | "text", None) => FieldType::VarChar {
                length: DEFAULT_VARCHAR_LENGTH,
            },
            ("varchar" | "string", Some(len)) => FieldType::VarChar {
                length: parse_u32(len)?,
            },
            ("date", None) => FieldType::Date,
            ("timestamp" | "datetime", None) => FieldType::Timestamp,
            ("timestamptz", None) => FieldType::TimestampTz,
            _ => FieldType::Other(declared.to_string()),
        };
        Ok(field_type)
    }
}

/// A single named field with an optional declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: Option<FieldType>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type: Some(field_type),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: None,
        }
    }

    /// Parse `name` or `name:type`.
    pub fn parse(decl: &str) -> Result<Self, String> {
        match decl.split_once(':') {
            Some((name, ty)) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(format!("Missing field name in '{decl}'"));
                }
                Ok(Field::new(name, ty.parse()?))
            }
            None if !decl.trim().is_empty() => Ok(Field::untyped(decl.trim())),
            None => Err("Empty field declaration".to_string()),
        }
    }
}

/// The field list of a record producer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fields {
    /// Shape not known.
    #[default]
    Unknown,
    /// "All fields" wildcard.
    All,
    /// Explicit ordered field declarations.
    Declared(Vec<Field>),
}

impl Fields {
    pub fn declared(fields: impl IntoIterator<Item = Field>) -> Self {
        Fields::Declared(fields.into_iter().collect())
    }

    /// Parse a comma-separated list of `name:type` declarations.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut fields = Vec::new();
        for decl in split_declarations(list) {
            fields.push(Field::parse(&decl)?);
        }
        if fields.is_empty() {
            return Ok(Fields::Unknown);
        }
        Ok(Fields::Declared(fields))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Fields::Unknown | Fields::All)
    }

    pub fn as_slice(&self) -> &[Field] {
        match self {
            Fields::Declared(fields) => fields,
            Fields::Unknown | Fields::All => &[],
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.as_slice().iter().map(|f| f.name.clone()).collect()
    }

    /// DDL types by position; `None` where a field is untyped.
    pub fn ddl_types(&self) -> Vec<Option<String>> {
        self.as_slice()
            .iter()
            .map(|f| f.field_type.as_ref().map(FieldType::to_ddl))
            .collect()
    }

    /// Whether the list is concrete and every field carries a type.
    pub fn has_types(&self) -> bool {
        match self {
            Fields::Declared(fields) => {
                !fields.is_empty() && fields.iter().all(|f| f.field_type.is_some())
            }
            Fields::Unknown | Fields::All => false,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Split on commas that are not inside parentheses, so `decimal(10,2)`
/// stays one declaration.
fn split_declarations(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}
