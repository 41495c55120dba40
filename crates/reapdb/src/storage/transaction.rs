//! Transaction support for atomic bulk operations.

use sled::transaction::{ConflictableTransactionError, TransactionError};

use super::engine::row_key;
use super::{Record, RowStore};
use crate::error::Error;
use crate::rowset::RowId;
use crate::value::Value;

/// A pending operation in a transaction.
#[derive(Debug, Clone)]
pub enum TransactionOp {
    /// Set a single field on a row.
    SetField {
        /// Entity type name.
        entity: String,
        /// Row identifier.
        id: RowId,
        /// Field to set.
        field: String,
        /// New value.
        value: Value,
    },
    /// Delete a row.
    Delete {
        /// Entity type name.
        entity: String,
        /// Row identifier.
        id: RowId,
    },
}

/// A transaction of queued bulk operations.
///
/// Operations are collected and executed atomically on commit; either every
/// queued update and delete lands or none do. Commit first verifies that the
/// resulting state holds no dangling references, so a delete that an
/// unhandled relation still points at aborts with
/// [`Error::ConstraintViolation`] and leaves the store untouched.
pub struct Transaction<'a> {
    store: &'a RowStore,
    ops: Vec<TransactionOp>,
}

impl<'a> Transaction<'a> {
    /// Create a new transaction.
    pub(crate) fn new(store: &'a RowStore) -> Self {
        Self {
            store,
            ops: Vec::new(),
        }
    }

    /// Queue a field update.
    pub fn set_field(
        &mut self,
        entity: impl Into<String>,
        id: RowId,
        field: impl Into<String>,
        value: Value,
    ) -> &mut Self {
        self.ops.push(TransactionOp::SetField {
            entity: entity.into(),
            id,
            field: field.into(),
            value,
        });
        self
    }

    /// Queue a row deletion.
    pub fn delete(&mut self, entity: impl Into<String>, id: RowId) -> &mut Self {
        self.ops.push(TransactionOp::Delete {
            entity: entity.into(),
            id,
        });
        self
    }

    /// Get the pending operations.
    pub fn operations(&self) -> &[TransactionOp] {
        &self.ops
    }

    /// Get the number of pending operations.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Commit the transaction atomically.
    ///
    /// All operations succeed or none do.
    pub fn commit(self) -> Result<(), Error> {
        if self.ops.is_empty() {
            return Ok(());
        }

        self.store.verify_referential_integrity(&self.ops)?;

        let result: Result<(), TransactionError<Error>> =
            self.store.data_tree().transaction(|tx| {
                for op in &self.ops {
                    match op {
                        TransactionOp::SetField {
                            entity,
                            id,
                            field,
                            value,
                        } => {
                            let key = row_key(entity, id);
                            // A row deleted earlier in this transaction or
                            // already gone needs no update.
                            if let Some(bytes) = tx.get(&key)? {
                                let mut record = Record::from_bytes(&bytes)
                                    .map_err(ConflictableTransactionError::Abort)?;
                                record.set(field, value.clone());
                                let encoded = record
                                    .to_bytes()
                                    .map_err(ConflictableTransactionError::Abort)?;
                                tx.insert(key.as_slice(), encoded)?;
                            }
                        }
                        TransactionOp::Delete { entity, id } => {
                            tx.remove(row_key(entity, id).as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }

    /// Rollback the transaction (discard all pending operations).
    pub fn rollback(self) {
        drop(self.ops);
    }
}

impl RowStore {
    /// Begin a new transaction.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }
}
