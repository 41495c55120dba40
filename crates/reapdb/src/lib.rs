//! reapdb - Embedded row store with planned, batched cascading deletion.
//!
//! The crate is built around three pieces:
//!
//! - [`catalog`] - a static schema descriptor: entities, fields, and the
//!   relations between them, each carrying a delete behavior.
//! - [`storage`] - a sled-backed row store with an atomic, queued-operation
//!   transaction and commit-time referential-integrity checks.
//! - [`delete`] - the deletion pipeline: a dependency [`Collector`] that
//!   walks the relation graph classifying dependent row sets, and a batch
//!   executor that applies all accumulated work in one transaction.
//!
//! Row sets ([`RowSet`]) are cheap, lazily evaluated query values. The
//! collector composes them instead of materializing rows, so discovering the
//! dependents of ten thousand rows costs the same number of store operations
//! as discovering the dependents of one.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod delete;
pub mod error;
pub mod rowset;
pub mod storage;
pub mod value;

pub use catalog::{
    DeleteBehavior, EntityDef, FieldDef, FieldType, RelationDef, RelationKind, Schema,
};
pub use delete::{purge, BatchExecutor, CollectionState, Collector, DeleteSummary};
pub use error::{Error, SchemaError};
pub use rowset::{Predicate, RowId, RowSet};
pub use storage::{Record, RowStore, StorageConfig, Transaction};
pub use value::Value;
