//! Entity and field definitions.

use serde::{Deserialize, Serialize};

/// An entity definition (table schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within schema).
    pub name: String,
    /// Name of the identity field.
    pub identity_field: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
}

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field may hold null.
    pub nullable: bool,
}

/// Field data types, matching the [`crate::Value`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 16-byte row identifier.
    Uuid,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Bytes,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>, identity_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_field: identity_field.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl FieldDef {
    /// Create a non-nullable field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    /// Create a nullable field.
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("Job", "id")
            .with_field(FieldDef::new("id", FieldType::Uuid))
            .with_field(FieldDef::new("name", FieldType::String))
            .with_field(FieldDef::nullable("finished", FieldType::Bool));

        assert_eq!(entity.name, "Job");
        assert_eq!(entity.identity_field, "id");
        assert_eq!(entity.fields.len(), 3);
    }

    #[test]
    fn test_get_field() {
        let entity = EntityDef::new("Job", "id")
            .with_field(FieldDef::new("id", FieldType::Uuid))
            .with_field(FieldDef::nullable("name", FieldType::String));

        assert!(entity.get_field("id").is_some());
        assert!(entity.get_field("name").unwrap().nullable);
        assert!(entity.get_field("missing").is_none());
    }
}
