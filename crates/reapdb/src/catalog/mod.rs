//! Schema descriptor: entities, fields, and relations.
//!
//! The descriptor is plain data, built once at startup and immutable after
//! validation. The deletion pipeline walks it directly; nothing in this
//! crate inspects live rows to discover structure.

mod entity;
mod relation;
mod schema;

pub use entity::{EntityDef, FieldDef, FieldType};
pub use relation::{DeleteBehavior, RelationDef, RelationKind};
pub use schema::Schema;
