//! The engine's services: invalidation, rebuild, sync, queue fan-out and
//! the periodic sweeps.

pub mod invalidate;
pub mod queue;
pub mod rebuild;
pub mod sweep;
pub mod sync;
pub mod worker;

pub use invalidate::InvalidationService;
pub use queue::{ChannelDispatcher, QueueProcessor, QueuePublisher, SyncTask, TaskDispatcher};
pub use rebuild::RebuildService;
pub use sweep::Sweeper;
pub use sync::SyncService;
pub use worker::TaskConsumer;
