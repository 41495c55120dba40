//! Lazily evaluated row sets.
//!
//! A [`RowSet`] describes "all rows of one entity type matching a predicate".
//! It is a cheap, cloneable value, never a materialized collection: the
//! dependent set of a deletion frontier references the frontier row set
//! itself through [`Predicate::FieldInSet`], and only the store evaluates
//! the composition. This keeps graph discovery at one store operation per
//! relation edge instead of one per row.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Identifier of a stored row.
pub type RowId = [u8; 16];

/// A filtered, lazily evaluated set of rows of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    /// Entity type the rows belong to.
    pub entity: String,
    /// Filter predicate.
    pub predicate: Predicate,
}

/// Filter predicate over rows of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Every row of the entity.
    All,
    /// Rows whose identifier is in the given list.
    IdIn(Vec<RowId>),
    /// Rows whose field equals the value.
    FieldEq {
        /// Field to test.
        field: String,
        /// Value to match.
        value: Value,
    },
    /// Rows whose field value is a member of a column projected from another
    /// row set.
    FieldInSet {
        /// Field to test on this row set's entity.
        field: String,
        /// Row set supplying the membership column.
        source: Box<RowSet>,
        /// Field projected from `source`.
        source_field: String,
    },
    /// Conjunction of predicates.
    And(Vec<Predicate>),
}

impl RowSet {
    /// Every row of an entity type.
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: Predicate::All,
        }
    }

    /// Rows of an entity type with the given identifiers.
    pub fn by_ids(entity: impl Into<String>, ids: Vec<RowId>) -> Self {
        Self {
            entity: entity.into(),
            predicate: Predicate::IdIn(ids),
        }
    }

    /// A single row by identifier.
    pub fn by_id(entity: impl Into<String>, id: RowId) -> Self {
        Self::by_ids(entity, vec![id])
    }

    /// Rows of an entity type matching an arbitrary predicate.
    pub fn filtered(entity: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            entity: entity.into(),
            predicate,
        }
    }
}
