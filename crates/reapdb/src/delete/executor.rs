//! Batched execution of collected deletion work.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use super::collector::CollectionState;
use crate::error::Error;
use crate::rowset::RowId;
use crate::storage::RowStore;

/// Per-type row counts returned by a deletion.
///
/// Counts cover deleted rows only; nulled-out references are applied but not
/// counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSummary {
    /// Total rows deleted.
    pub total: u64,
    /// Rows deleted per entity type. Types with no deleted rows are absent.
    pub per_type: HashMap<String, u64>,
}

impl DeleteSummary {
    /// Whether the deletion removed nothing.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Replays a [`CollectionState`] as the minimum number of physical
/// operations inside one atomic transaction.
///
/// No graph walking happens here: the state is already fully classified, so
/// execution is field updates, then fast deletes, then one unioned delete
/// per remaining entity type. Updates run first so that surviving rows no
/// longer reference rows about to be removed.
pub struct BatchExecutor<'a> {
    store: &'a RowStore,
}

impl<'a> BatchExecutor<'a> {
    /// Create an executor against a store.
    pub fn new(store: &'a RowStore) -> Self {
        Self { store }
    }

    /// Execute the collected state. Any failure aborts the whole
    /// transaction; no partial counts are ever returned.
    pub fn execute(&self, state: CollectionState) -> Result<DeleteSummary, Error> {
        let mut tx = self.store.transaction();

        // Null out references held by surviving rows.
        for (entity, updates) in &state.field_updates {
            for ((field, value), row_sets) in updates {
                for row_set in row_sets {
                    for id in self.store.select_ids(row_set)? {
                        tx.set_field(entity.clone(), id, field.clone(), value.clone());
                    }
                }
            }
        }

        let mut per_type: HashMap<String, u64> = HashMap::new();
        // Rows already queued for deletion, per type. A row reached both
        // through a fast set and a full set must be deleted and counted once.
        let mut queued: HashMap<String, HashSet<RowId>> = HashMap::new();

        // Fast deletes: one id selection per row set, no descent.
        for row_set in &state.fast_deletes {
            let ids = self.store.select_ids(row_set)?;
            let seen = queued.entry(row_set.entity.clone()).or_default();
            let mut removed = 0u64;
            for id in ids {
                if seen.insert(id) {
                    tx.delete(row_set.entity.clone(), id);
                    removed += 1;
                }
            }
            if removed > 0 {
                *per_type.entry(row_set.entity.clone()).or_default() += removed;
            }
        }

        // Full deletes: union every row set accumulated for a type into one
        // identifier set, then delete the union.
        for (entity, row_sets) in &state.to_delete {
            let mut union: HashSet<RowId> = HashSet::new();
            for row_set in row_sets {
                union.extend(self.store.select_ids(row_set)?);
            }

            let seen = queued.entry(entity.clone()).or_default();
            let mut removed = 0u64;
            for id in union {
                if seen.insert(id) {
                    tx.delete(entity.clone(), id);
                    removed += 1;
                }
            }
            if removed > 0 {
                *per_type.entry(entity.clone()).or_default() += removed;
            }
        }

        // Empty plans issue no writes at all.
        if tx.operation_count() == 0 {
            debug!("nothing to delete");
            return Ok(DeleteSummary::default());
        }

        tx.commit()?;

        let total = per_type.values().sum();
        info!(total, types = per_type.len(), "cascade delete committed");
        Ok(DeleteSummary { total, per_type })
    }
}
