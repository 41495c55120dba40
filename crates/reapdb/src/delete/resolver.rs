//! Dependent row-set resolution.
//!
//! Resolution is pure query composition. The dependent set of a frontier is
//! expressed as a membership predicate over the frontier row set itself, so
//! no identifier list ever crosses this boundary; the store evaluates the
//! nested query when the executor needs concrete rows.

use crate::catalog::{RelationDef, RelationKind, Schema};
use crate::error::SchemaError;
use crate::rowset::{Predicate, RowSet};
use crate::value::Value;

/// Resolve the row sets dependent on a frontier of `entity` rows.
///
/// Returns one `(dependent entity, dependent row set, relation)` triple per
/// relation pointing at `entity`, parent links included.
pub fn resolve<'a>(
    schema: &'a Schema,
    entity: &str,
    frontier: &RowSet,
) -> Result<Vec<(String, RowSet, &'a RelationDef)>, SchemaError> {
    let identity = schema.identity_field(entity)?;

    Ok(schema
        .relations_targeting(entity)
        .into_iter()
        .map(|relation| {
            (
                relation.from_entity.clone(),
                dependent_row_set(relation, identity, frontier),
                relation,
            )
        })
        .collect())
}

/// Build the row set of `relation.from_entity` rows referencing the frontier.
fn dependent_row_set(relation: &RelationDef, target_identity: &str, frontier: &RowSet) -> RowSet {
    let membership = |field: &str| Predicate::FieldInSet {
        field: field.to_string(),
        source: Box::new(frontier.clone()),
        source_field: target_identity.to_string(),
    };

    match &relation.kind {
        RelationKind::Column { field } => {
            RowSet::filtered(relation.from_entity.clone(), membership(field))
        }
        // Generic references match on both halves of the (type, id) pair.
        RelationKind::Generic {
            type_field,
            id_field,
        } => RowSet::filtered(
            relation.from_entity.clone(),
            Predicate::And(vec![
                Predicate::FieldEq {
                    field: type_field.clone(),
                    value: Value::String(relation.to_entity.clone()),
                },
                membership(id_field),
            ]),
        ),
    }
}

/// Build the row set of parent rows a child frontier extends through a
/// multi-table-inheritance link.
pub(crate) fn parent_row_set(
    relation: &RelationDef,
    parent_identity: &str,
    children: &RowSet,
) -> Option<RowSet> {
    let RelationKind::Column { field } = &relation.kind else {
        return None;
    };

    Some(RowSet::filtered(
        relation.to_entity.clone(),
        Predicate::FieldInSet {
            field: parent_identity.to_string(),
            source: Box::new(children.clone()),
            source_field: field.clone(),
        },
    ))
}
