//! Relation definitions between entities.

use serde::{Deserialize, Serialize};

/// Behavior when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteBehavior {
    /// Delete referencing rows recursively.
    Cascade,
    /// Null out the referencing field; the referencing row survives.
    SetNull,
    /// Never traversed; the store's own constraints guard these references.
    NoAction,
}

/// How the referencing field is encoded on the source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Ordinary single-column foreign key.
    Column {
        /// Foreign-key field on the source entity.
        field: String,
    },
    /// Polymorphic reference: a (type tag, id) field pair. The tag names the
    /// target entity, so one field pair can point at rows of many types.
    Generic {
        /// Field holding the target entity name.
        type_field: String,
        /// Field holding the target row identifier.
        id_field: String,
    },
}

/// A relation definition between two entities.
///
/// The relation lives on the source entity (the side holding the reference)
/// and points at the target entity (the side being referenced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name (unique within schema).
    pub name: String,
    /// Source entity holding the reference.
    pub from_entity: String,
    /// How the reference is encoded.
    pub kind: RelationKind,
    /// Target entity being referenced.
    pub to_entity: String,
    /// Delete behavior.
    pub on_delete: DeleteBehavior,
    /// Whether the reference may be null.
    pub nullable: bool,
    /// Marks a multi-table-inheritance link from a child entity to the row
    /// it extends. Parent rows survive only as long as their children.
    pub parent_link: bool,
}

impl RelationDef {
    /// Create an ordinary foreign-key relation.
    pub fn column(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        field: impl Into<String>,
        to_entity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            kind: RelationKind::Column {
                field: field.into(),
            },
            to_entity: to_entity.into(),
            on_delete: DeleteBehavior::NoAction,
            nullable: false,
            parent_link: false,
        }
    }

    /// Create a generic (polymorphic) relation targeting one entity type.
    pub fn generic(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        type_field: impl Into<String>,
        id_field: impl Into<String>,
        to_entity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            kind: RelationKind::Generic {
                type_field: type_field.into(),
                id_field: id_field.into(),
            },
            to_entity: to_entity.into(),
            on_delete: DeleteBehavior::NoAction,
            nullable: false,
            parent_link: false,
        }
    }

    /// Create a multi-table-inheritance parent link from a child entity.
    pub fn parent_link(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        field: impl Into<String>,
        to_entity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            kind: RelationKind::Column {
                field: field.into(),
            },
            to_entity: to_entity.into(),
            on_delete: DeleteBehavior::Cascade,
            nullable: false,
            parent_link: true,
        }
    }

    /// Set delete behavior.
    pub fn with_on_delete(mut self, on_delete: DeleteBehavior) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Mark the reference as nullable.
    pub fn with_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The referencing field, for diagnostics. Generic relations report the
    /// id half of the pair.
    pub fn referencing_field(&self) -> &str {
        match &self.kind {
            RelationKind::Column { field } => field,
            RelationKind::Generic { id_field, .. } => id_field,
        }
    }
}
