//! # keeper-core
//!
//! Storage core for Keeper, the game server administration tool.
//!
//! Everything Keeper remembers between runs (command history, scheduled
//! tasks, server configurations, player records, settings) lives in a single
//! JSON document owned by a [`Store`]. The store keeps the document in memory,
//! coalesces bursts of mutations into one debounced write and protects the file
//! with rolling backups.
//!
//! ## Key Concepts
//!
//! - **Document**: The root persisted structure holding every collection
//! - **Store**: Engine handle with an explicit `open` / `shutdown` lifecycle
//! - **Backup**: Timestamped copy of the primary file used for recovery

pub mod event_bus;
pub mod paths;
pub mod persistence;

// Re-export commonly used types
pub use event_bus::{StatusBus, StatusEvent, StatusKind};
pub use paths::DataPaths;
pub use persistence::{Document, Store, StoreConfig, StoreError};
