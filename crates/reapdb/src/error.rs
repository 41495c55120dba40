//! Error types.

use thiserror::Error;

/// Schema descriptor errors.
///
/// These surface during descriptor construction or lookup, always before any
/// write has been issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Entity type is not known to the schema.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Field is not declared on the entity.
    #[error("unknown field {entity}.{field}")]
    UnknownField {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// A SET NULL relation requires a nullable column field.
    #[error("relation {0}: SET NULL requires a nullable column field")]
    SetNullNotNullable(String),

    /// Generic relations cannot null out their reference pair.
    #[error("relation {0}: generic relations only support CASCADE or NO ACTION")]
    GenericSetNull(String),

    /// Parent links must be non-nullable cascade columns.
    #[error("relation {0}: parent links must be non-nullable cascade columns")]
    InvalidParentLink(String),

    /// Relation names must be unique within a schema.
    #[error("duplicate relation name: {0}")]
    DuplicateRelation(String),
}

/// Errors surfaced by storage, collection, and execution.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Schema descriptor error.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A delete would leave a surviving row referencing a removed row.
    #[error("constraint violation: {referencing_entity}.{field} still references {entity}")]
    ConstraintViolation {
        /// Entity whose rows were being deleted.
        entity: String,
        /// Entity holding the dangling reference.
        referencing_entity: String,
        /// Referencing field.
        field: String,
    },

    /// Dependency collection recursed past the depth limit.
    #[error("collection depth {depth} exceeds the maximum")]
    DepthExceeded {
        /// Depth at which collection was abandoned.
        depth: usize,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Key decoding error.
    #[error("invalid key format")]
    InvalidKey,
}
