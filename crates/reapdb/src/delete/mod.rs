//! Cascading deletion: dependency collection and batched execution.
//!
//! Deleting a row set happens in two phases. The [`Collector`] walks the
//! relation graph depth-first from the seed, classifying every dependent row
//! set as a full delete, a fast delete, or a field update. The
//! [`BatchExecutor`] then replays the accumulated state as the minimum number
//! of physical operations inside one atomic transaction. No graph walking
//! happens during execution, and no row data is materialized during
//! collection.

mod collector;
mod executor;
mod resolver;

pub use collector::{purge, CollectionState, Collector};
pub use executor::{BatchExecutor, DeleteSummary};
pub use resolver::resolve;
