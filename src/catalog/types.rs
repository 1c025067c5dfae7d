//! Field types for RecStore
//!
//! Type descriptors are informational: records are never checked against them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Field type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Unresolved; any value is accepted
    #[default]
    Any,
    /// Boolean
    Boolean,
    /// 64-bit integer
    Integer,
    /// 64-bit float
    Float,
    /// Text
    Text,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "ANY"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Float => write!(f, "FLOAT"),
            FieldType::Text => write!(f, "TEXT"),
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(FieldType::Any),
            "bool" | "boolean" => Ok(FieldType::Boolean),
            "int" | "integer" => Ok(FieldType::Integer),
            "float" | "double" => Ok(FieldType::Float),
            "text" | "string" | "str" => Ok(FieldType::Text),
            other => Err(Error::ParseError(format!("unknown field type '{}'", other))),
        }
    }
}
