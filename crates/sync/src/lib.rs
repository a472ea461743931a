//! Pelican Sync - Catalog indexing and synchronization engine.
//!
//! Mirrors a merchant catalog into a local indexed representation and keeps
//! the recommendation platform in step with it:
//!
//! 1. **Invalidation** reacts to catalog changes by flagging per-(product,
//!    store) index entries dirty, redirecting variant changes to their
//!    composite parents.
//! 2. **Rebuild** turns dirty entries back into trusted snapshots, clearing
//!    `in_sync` only when the snapshot actually changed.
//! 3. **Sync** pushes out-of-sync snapshots upstream in batches and purges
//!    soft-deleted entries, fire-and-mark style.
//!
//! A queue publisher fans large id lists out into asynchronous chunks, and
//! periodic sweeps re-discover anything the event path missed. The whole
//! pipeline is idempotent and self-healing: a lost or duplicated update is
//! corrected on the next pass.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod instrument;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use builder::{BuildError, BuilderConfig, SnapshotBuilder, SnapshotHook};
pub use config::{Config, ConfigError};
pub use error::SyncError;
pub use state::AppState;
