//! Schema definitions for RecStore
//!
//! This module defines fields and the table definitions stored in the catalog.

use super::types::FieldType;
use serde::{Deserialize, Serialize};

/// A field of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Type descriptor
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Create a field with an unresolved type
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Any)
    }
}

/// Table definition - one catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Declared fields
    pub fields: Vec<Field>,
    /// Name of the unique key field
    pub key_field: String,
}

impl TableDef {
    /// Create a new table definition
    pub fn new(name: impl Into<String>, fields: Vec<Field>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            key_field: key_field.into(),
        }
    }

    /// Get field by name
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check if the key field is one of the declared fields
    pub fn has_valid_key(&self) -> bool {
        self.get_field(&self.key_field).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_def() {
        let def = TableDef::new(
            "users",
            vec![Field::new("id", FieldType::Integer), Field::any("name")],
            "id",
        );

        assert_eq!(def.name, "users");
        assert!(def.has_valid_key());
        assert_eq!(def.get_field("name").unwrap().field_type, FieldType::Any);
        assert!(def.get_field("email").is_none());
    }

    #[test]
    fn test_row_json_shape() {
        let def = TableDef::new("t", vec![Field::new("k", FieldType::Text)], "k");
        let json = serde_json::to_string(&def).unwrap();
        assert_eq!(
            json,
            r#"{"name":"t","fields":[{"name":"k","type":"text"}],"key_field":"k"}"#
        );

        let row: TableDef =
            serde_json::from_str(r#"{"name":"t","fields":[{"name":"k"}],"key_field":"k"}"#)
                .unwrap();
        assert_eq!(row.fields[0].field_type, FieldType::Any);
    }
}
