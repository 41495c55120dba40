//! Row store implementation.

use std::collections::{HashMap, HashSet};

use sled::{Db, Tree};
use tracing::debug;

use super::transaction::TransactionOp;
use super::{Record, StorageConfig};
use crate::catalog::{RelationKind, Schema};
use crate::error::Error;
use crate::rowset::{Predicate, RowId, RowSet};
use crate::value::Value;

/// Tree name for row data.
const DATA_TREE: &str = "rows";

/// The row store: a sled database plus the schema it serves.
pub struct RowStore {
    /// The underlying sled database.
    db: Db,

    /// Tree holding encoded rows keyed by `entity\0id`.
    data_tree: Tree,

    /// Schema descriptor, validated at open time.
    schema: Schema,
}

/// A predicate with every membership sub-query resolved to a value set.
enum CompiledPredicate {
    All,
    IdIn(HashSet<RowId>),
    FieldEq { field: String, value: Value },
    FieldInValues { field: String, values: HashSet<Value> },
    And(Vec<CompiledPredicate>),
}

impl RowStore {
    /// Open or create a row store for the given schema.
    pub fn open(config: StorageConfig, schema: Schema) -> Result<Self, Error> {
        schema.validate()?;

        let db = config.to_sled_config().open()?;
        let data_tree = db.open_tree(DATA_TREE)?;
        debug!(path = ?config.path, temporary = config.temporary, "opened row store");

        Ok(Self {
            db,
            data_tree,
            schema,
        })
    }

    /// The schema this store was opened with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Generate a new row identifier (UUID v4 layout).
    pub fn generate_id() -> RowId {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        // Counter to ensure uniqueness even with same timestamp
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&now.to_le_bytes());
        id[8..16].copy_from_slice(&counter.to_le_bytes());

        // Set UUID version 4 bits
        id[6] = (id[6] & 0x0f) | 0x40;
        id[8] = (id[8] & 0x3f) | 0x80;

        id
    }

    /// Insert a row.
    pub fn insert(
        &self,
        entity: &str,
        id: RowId,
        fields: Vec<(String, Value)>,
    ) -> Result<(), Error> {
        self.schema.entity(entity)?;
        let record = Record::new(fields);
        self.data_tree
            .insert(row_key(entity, &id), record.to_bytes()?)?;
        Ok(())
    }

    /// Get a row by identifier.
    pub fn get(&self, entity: &str, id: &RowId) -> Result<Option<Record>, Error> {
        self.schema.entity(entity)?;
        match self.data_tree.get(row_key(entity, id))? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan all rows of an entity type.
    pub fn scan(&self, entity: &str) -> impl Iterator<Item = Result<(RowId, Record), Error>> + '_ {
        self.data_tree
            .scan_prefix(key_prefix(entity))
            .map(|item| -> Result<(RowId, Record), Error> {
                let (key, value) = item?;
                Ok((decode_row_key(&key)?, Record::from_bytes(&value)?))
            })
    }

    /// Count the rows of an entity type.
    pub fn count(&self, entity: &str) -> Result<u64, Error> {
        self.schema.entity(entity)?;
        let mut n = 0u64;
        for item in self.scan(entity) {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// Cheap existence probe: stops at the first matching row.
    pub fn exists(&self, row_set: &RowSet) -> Result<bool, Error> {
        let identity = self.schema.identity_field(&row_set.entity)?.to_string();
        let compiled = self.compile(&row_set.predicate)?;

        for item in self.scan(&row_set.entity) {
            let (id, record) = item?;
            if row_matches(&identity, &compiled, id, &record) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Resolve a row set to its identifiers.
    pub fn select_ids(&self, row_set: &RowSet) -> Result<Vec<RowId>, Error> {
        let identity = self.schema.identity_field(&row_set.entity)?.to_string();
        let compiled = self.compile(&row_set.predicate)?;

        let mut ids = Vec::new();
        for item in self.scan(&row_set.entity) {
            let (id, record) = item?;
            if row_matches(&identity, &compiled, id, &record) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Project one column of a row set into a value set. Nulls are dropped.
    pub fn project(&self, row_set: &RowSet, field: &str) -> Result<HashSet<Value>, Error> {
        let identity = self.schema.identity_field(&row_set.entity)?.to_string();
        let compiled = self.compile(&row_set.predicate)?;

        let mut values = HashSet::new();
        for item in self.scan(&row_set.entity) {
            let (id, record) = item?;
            if !row_matches(&identity, &compiled, id, &record) {
                continue;
            }
            match field_value(&identity, id, &record, field) {
                Some(Value::Null) | None => {}
                Some(value) => {
                    values.insert(value);
                }
            }
        }
        Ok(values)
    }

    /// Flush dirty buffers to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(self.db.size_on_disk()?)
    }

    /// Get access to the underlying data tree (for transactions).
    pub(crate) fn data_tree(&self) -> &Tree {
        &self.data_tree
    }

    /// Resolve membership sub-queries so the predicate can be evaluated
    /// against one row at a time. Sub-queries are evaluated by the store
    /// itself; callers hand over composed queries, never id lists.
    fn compile(&self, predicate: &Predicate) -> Result<CompiledPredicate, Error> {
        Ok(match predicate {
            Predicate::All => CompiledPredicate::All,
            Predicate::IdIn(ids) => CompiledPredicate::IdIn(ids.iter().copied().collect()),
            Predicate::FieldEq { field, value } => CompiledPredicate::FieldEq {
                field: field.clone(),
                value: value.clone(),
            },
            Predicate::FieldInSet {
                field,
                source,
                source_field,
            } => CompiledPredicate::FieldInValues {
                field: field.clone(),
                values: self.project(source, source_field)?,
            },
            Predicate::And(predicates) => CompiledPredicate::And(
                predicates
                    .iter()
                    .map(|p| self.compile(p))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Check that no surviving row references a row deleted by the queued
    /// operations. Pending field updates are applied to the row image before
    /// the check, so references nulled in the same transaction do not count.
    pub(crate) fn verify_referential_integrity(
        &self,
        ops: &[TransactionOp],
    ) -> Result<(), Error> {
        let mut deleted: HashMap<&str, HashSet<RowId>> = HashMap::new();
        let mut updates: HashMap<(&str, RowId), Vec<(&str, &Value)>> = HashMap::new();

        for op in ops {
            match op {
                TransactionOp::Delete { entity, id } => {
                    deleted.entry(entity).or_default().insert(*id);
                }
                TransactionOp::SetField {
                    entity,
                    id,
                    field,
                    value,
                } => {
                    updates
                        .entry((entity, *id))
                        .or_default()
                        .push((field, value));
                }
            }
        }

        if deleted.is_empty() {
            return Ok(());
        }

        for relation in &self.schema.relations {
            let Some(target_ids) = deleted.get(relation.to_entity.as_str()) else {
                continue;
            };

            for item in self.scan(&relation.from_entity) {
                let (id, mut record) = item?;

                if deleted
                    .get(relation.from_entity.as_str())
                    .is_some_and(|ids| ids.contains(&id))
                {
                    continue;
                }
                if let Some(pending) = updates.get(&(relation.from_entity.as_str(), id)) {
                    for (field, value) in pending {
                        record.set(field, (*value).clone());
                    }
                }

                let dangling = match &relation.kind {
                    RelationKind::Column { field } => {
                        matches!(record.get(field), Some(Value::Uuid(rid)) if target_ids.contains(rid))
                    }
                    RelationKind::Generic {
                        type_field,
                        id_field,
                    } => {
                        matches!(record.get(type_field), Some(Value::String(tag)) if *tag == relation.to_entity)
                            && matches!(record.get(id_field), Some(Value::Uuid(rid)) if target_ids.contains(rid))
                    }
                };

                if dangling {
                    debug!(
                        row = %hex::encode(id),
                        relation = %relation.name,
                        "dangling reference blocks delete"
                    );
                    return Err(Error::ConstraintViolation {
                        entity: relation.to_entity.clone(),
                        referencing_entity: relation.from_entity.clone(),
                        field: relation.referencing_field().to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Evaluate a compiled predicate against one row.
fn row_matches(identity: &str, compiled: &CompiledPredicate, id: RowId, record: &Record) -> bool {
    match compiled {
        CompiledPredicate::All => true,
        CompiledPredicate::IdIn(ids) => ids.contains(&id),
        CompiledPredicate::FieldEq { field, value } => {
            field_value(identity, id, record, field).is_some_and(|v| v == *value)
        }
        CompiledPredicate::FieldInValues { field, values } => {
            match field_value(identity, id, record, field) {
                Some(Value::Null) | None => false,
                Some(value) => values.contains(&value),
            }
        }
        CompiledPredicate::And(predicates) => predicates
            .iter()
            .all(|p| row_matches(identity, p, id, record)),
    }
}

/// Read a field off a row; the identity field resolves from the key.
fn field_value(identity: &str, id: RowId, record: &Record, field: &str) -> Option<Value> {
    if field == identity {
        Some(Value::Uuid(id))
    } else {
        record.get(field).cloned()
    }
}

/// Build the storage key for a row: `entity\0id`.
pub(crate) fn row_key(entity: &str, id: &RowId) -> Vec<u8> {
    let mut key = Vec::with_capacity(entity.len() + 1 + 16);
    key.extend_from_slice(entity.as_bytes());
    key.push(0);
    key.extend_from_slice(id);
    key
}

/// Key prefix covering all rows of an entity type.
fn key_prefix(entity: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(entity.len() + 1);
    prefix.extend_from_slice(entity.as_bytes());
    prefix.push(0);
    prefix
}

/// Extract the row identifier from a storage key.
fn decode_row_key(key: &[u8]) -> Result<RowId, Error> {
    if key.len() < 17 {
        return Err(Error::InvalidKey);
    }
    key[key.len() - 16..].try_into().map_err(|_| Error::InvalidKey)
}
