//! Domain models for the indexing and sync engine.

pub mod index_entry;
pub mod queue;
pub mod snapshot;

pub use index_entry::IndexEntry;
pub use queue::{QueueAction, QueueStatus, UpdateQueueEntry};
pub use snapshot::{
    Availability, CategoryPath, EmptyCategoryPath, ProductSnapshot, SkuSnapshot, SnapshotEnvelope,
    VariationSnapshot,
};
