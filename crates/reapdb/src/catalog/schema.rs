//! Schema: the full descriptor an engine runs against.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{DeleteBehavior, EntityDef, RelationDef, RelationKind};
use crate::error::{Error, SchemaError};

/// The complete schema descriptor: entities plus the relations between them.
///
/// Built once at startup (in code or from JSON), validated, then treated as
/// immutable. All deletion planning reads this structure; nothing reflects
/// over stored rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Entity definitions keyed by name.
    pub entities: HashMap<String, EntityDef>,
    /// Relation definitions, in declaration order.
    pub relations: Vec<RelationDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add a relation to the schema.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Get an entity definition by name.
    pub fn entity(&self, name: &str) -> Result<&EntityDef, SchemaError> {
        self.entities
            .get(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    /// Get the fields of an entity.
    pub fn fields(&self, entity: &str) -> Result<&[super::FieldDef], SchemaError> {
        Ok(&self.entity(entity)?.fields)
    }

    /// Get the identity field name of an entity.
    pub fn identity_field(&self, entity: &str) -> Result<&str, SchemaError> {
        Ok(&self.entity(entity)?.identity_field)
    }

    /// All relations pointing at an entity, parent links included.
    pub fn relations_targeting(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.to_entity == entity)
            .collect()
    }

    /// Parent links declared on an entity (multi-table inheritance).
    pub fn inheritance_parents(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.parent_link && r.from_entity == entity)
            .collect()
    }

    /// Validate the descriptor.
    ///
    /// Checks that relation endpoints and referencing fields exist, that
    /// relation names are unique, that SET NULL relations sit on nullable
    /// column fields, and that parent links are non-nullable cascade columns.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names: HashSet<&str> = HashSet::new();

        for relation in &self.relations {
            if !names.insert(&relation.name) {
                return Err(SchemaError::DuplicateRelation(relation.name.clone()));
            }

            let source = self.entity(&relation.from_entity)?;
            self.entity(&relation.to_entity)?;

            match &relation.kind {
                RelationKind::Column { field } => {
                    let field_def = source.get_field(field).ok_or_else(|| {
                        SchemaError::UnknownField {
                            entity: relation.from_entity.clone(),
                            field: field.clone(),
                        }
                    })?;

                    if relation.on_delete == DeleteBehavior::SetNull
                        && !(relation.nullable && field_def.nullable)
                    {
                        return Err(SchemaError::SetNullNotNullable(relation.name.clone()));
                    }
                }
                RelationKind::Generic {
                    type_field,
                    id_field,
                } => {
                    for field in [type_field, id_field] {
                        if source.get_field(field).is_none() {
                            return Err(SchemaError::UnknownField {
                                entity: relation.from_entity.clone(),
                                field: field.clone(),
                            });
                        }
                    }

                    if relation.on_delete == DeleteBehavior::SetNull {
                        return Err(SchemaError::GenericSetNull(relation.name.clone()));
                    }
                }
            }

            if relation.parent_link
                && (relation.nullable
                    || relation.on_delete != DeleteBehavior::Cascade
                    || !matches!(relation.kind, RelationKind::Column { .. }))
            {
                return Err(SchemaError::InvalidParentLink(relation.name.clone()));
            }
        }

        Ok(())
    }

    /// Load and validate a schema from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let schema: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialize the schema to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}
