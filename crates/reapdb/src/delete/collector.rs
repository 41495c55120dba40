//! Dependency collection for cascading deletes.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::executor::{BatchExecutor, DeleteSummary};
use super::resolver;
use crate::catalog::{DeleteBehavior, RelationKind, Schema};
use crate::error::Error;
use crate::rowset::RowSet;
use crate::storage::RowStore;
use crate::value::Value;

/// Maximum collection depth. Type-level reference cycles terminate on their
/// own because every step intersects against the calling frontier, but a
/// reference cycle between concrete rows would recurse forever without this
/// bound.
const MAX_COLLECT_DEPTH: usize = 100;

/// Working memory of one deletion operation.
///
/// Accumulated by [`Collector::collect`] and consumed by the batch executor.
/// Row sets registered for the same entity through different recursion
/// branches are kept as-is; deduplication happens once, at execution time.
#[derive(Debug, Default)]
pub struct CollectionState {
    /// Full-delete candidates per entity type, in registration order.
    pub(crate) to_delete: HashMap<String, Vec<RowSet>>,
    /// Row sets with no dependents of their own, deletable without descent.
    pub(crate) fast_deletes: Vec<RowSet>,
    /// Field updates per entity type, keyed by `(field, new value)`.
    pub(crate) field_updates: HashMap<String, HashMap<(String, Value), Vec<RowSet>>>,
}

/// Collects every row dependent on a seed row set, classified by the delete
/// behavior of the relation it was reached through.
///
/// One collector serves one deletion request: seed it with [`collect`],
/// inspect the buckets if desired, then consume it with [`delete`].
///
/// [`collect`]: Collector::collect
/// [`delete`]: Collector::delete
pub struct Collector<'a> {
    store: &'a RowStore,
    state: CollectionState,
    /// Discovered `dependent -> target` type edges, for diagnostics only.
    /// Execution order never consults these.
    dependencies: HashMap<String, HashSet<String>>,
}

impl<'a> Collector<'a> {
    /// Create a collector against a store.
    pub fn new(store: &'a RowStore) -> Self {
        Self {
            store,
            state: CollectionState::default(),
            dependencies: HashMap::new(),
        }
    }

    /// Collect a seed row set and everything that depends on it.
    ///
    /// An empty seed is a no-op; the check is an existence probe, so the set
    /// is never materialized just to find out it has no rows.
    pub fn collect(&mut self, root: &RowSet) -> Result<(), Error> {
        self.collect_inner(root, None, false, false, true, 0)
    }

    fn collect_inner(
        &mut self,
        root: &RowSet,
        source: Option<&str>,
        nullable: bool,
        reverse_dependency: bool,
        collect_related: bool,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > MAX_COLLECT_DEPTH {
            return Err(Error::DepthExceeded { depth });
        }

        let store = self.store;
        let schema: &Schema = store.schema();
        let entity = root.entity.clone();
        schema.entity(&entity)?;

        if !store.exists(root)? {
            return Ok(());
        }

        debug!(entity = %entity, depth, "registering row set for deletion");
        self.state
            .to_delete
            .entry(entity.clone())
            .or_default()
            .push(root.clone());
        if let Some(source) = source {
            if !nullable {
                self.add_dependency(source, &entity, reverse_dependency);
            }
        }

        // Multi-table inheritance stores one parent row per child row; the
        // parent survives only as long as the child, so it is collected as if
        // it depended on the child. Parents are registered without
        // re-expanding their incoming relations: the child side of the link
        // is already being collected, and walking it again from the parent
        // would bounce between the two forever.
        for parent in schema.inheritance_parents(&entity) {
            let parent_identity = schema.identity_field(&parent.to_entity)?;
            if let Some(parent_set) = resolver::parent_row_set(parent, parent_identity, root) {
                self.collect_inner(&parent_set, Some(&entity), false, true, false, depth + 1)?;
            }
        }

        if !collect_related {
            return Ok(());
        }

        for (dep_entity, dep_set, relation) in resolver::resolve(schema, &entity, root)? {
            match relation.on_delete {
                // The store's own constraints guard these references.
                DeleteBehavior::NoAction => continue,
                DeleteBehavior::SetNull => {
                    let field = match &relation.kind {
                        RelationKind::Column { field } => field.clone(),
                        // Schema validation rejects SET NULL on generic
                        // relations.
                        RelationKind::Generic { .. } => continue,
                    };
                    self.state
                        .field_updates
                        .entry(dep_entity)
                        .or_default()
                        .entry((field, Value::Null))
                        .or_default()
                        .push(dep_set);
                }
                DeleteBehavior::Cascade => {
                    if self.can_fast_delete(&dep_entity) {
                        debug!(entity = %dep_entity, "fast-delete candidate");
                        self.state.fast_deletes.push(dep_set);
                    } else {
                        self.collect_inner(
                            &dep_set,
                            Some(&entity),
                            relation.nullable,
                            false,
                            true,
                            depth + 1,
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    /// A type is fast-deletable when deleting its rows can have no side
    /// effects: nothing cascades from it, nothing needs nulling, and it has
    /// no parent rows to drag along.
    fn can_fast_delete(&self, entity: &str) -> bool {
        let schema = self.store.schema();
        schema.inheritance_parents(entity).is_empty()
            && schema
                .relations_targeting(entity)
                .iter()
                .all(|r| r.on_delete == DeleteBehavior::NoAction)
    }

    fn add_dependency(&mut self, source: &str, entity: &str, reverse: bool) {
        let (from, to) = if reverse {
            (entity, source)
        } else {
            (source, entity)
        };
        self.dependencies
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Type edges discovered so far, for diagnostics.
    pub fn dependencies(&self) -> &HashMap<String, HashSet<String>> {
        &self.dependencies
    }

    /// Full-delete candidates accumulated so far, per entity type.
    pub fn pending_deletes(&self) -> &HashMap<String, Vec<RowSet>> {
        &self.state.to_delete
    }

    /// Fast-delete row sets accumulated so far.
    pub fn fast_deletes(&self) -> &[RowSet] {
        &self.state.fast_deletes
    }

    /// Field updates accumulated so far, per entity type.
    pub fn field_updates(&self) -> &HashMap<String, HashMap<(String, Value), Vec<RowSet>>> {
        &self.state.field_updates
    }

    /// Execute the accumulated state in one atomic transaction.
    pub fn delete(self) -> Result<DeleteSummary, Error> {
        BatchExecutor::new(self.store).execute(self.state)
    }
}

/// Collect and delete in one call.
pub fn purge(store: &RowStore, root: &RowSet) -> Result<DeleteSummary, Error> {
    let mut collector = Collector::new(store);
    collector.collect(root)?;
    collector.delete()
}
