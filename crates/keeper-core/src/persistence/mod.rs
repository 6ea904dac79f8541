//! Persistence layer for everything Keeper remembers.
//!
//! # Overview
//!
//! All state lives in one JSON document owned by the [`Store`] engine:
//!
//! - **Engine** - In-memory mirror, debounced writes, startup recovery
//! - **Backups** - Timestamped snapshots with pruning
//! - **Schema** - Repairs missing or mis-shaped collections on load
//! - **Retention** - Caps log-style collections
//! - **Accessors** - Typed CRUD per collection, as methods on [`Store`]
//!
//! # File Locations
//!
//! ```text
//! <root>/
//! ├── data/
//! │   └── keeper.json                             # Primary store file
//! └── backups/
//!     ├── keeper-20260101T060000000000Z-auto.json
//!     └── keeper-20260101T070000000000Z-shutdown.json
//! ```
//!
//! # Design Principles
//!
//! ## Atomic Writes
//!
//! Every write of the primary file goes through a temp file:
//!
//! 1. Write and sync `keeper.json.tmp`
//! 2. Rename to `keeper.json` (atomic on Unix)
//!
//! ## Debounced Writes
//!
//! Accessors only mutate memory. A burst of mutations is written once, after
//! the debounce window closes.
//!
//! # Usage
//!
//! ```ignore
//! use keeper_core::{DataPaths, Store, StoreConfig};
//!
//! let paths = DataPaths::resolve(None)?;
//! let store = Store::open(&paths, StoreConfig::default()).await;
//!
//! store.add_command_history(NewCommand::new("say hello").succeeded(true));
//!
//! // On exit:
//! store.shutdown().await;
//! ```

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod retention;
pub mod schema;
pub mod types;

mod events;
mod history;
mod mods;
mod notes;
mod performance;
mod players;
mod presets;
mod servers;
mod settings;
mod stats;
mod tasks;

// Re-export commonly used items for convenience
pub use backup::{BackupInfo, BackupLabel, BackupManager};
pub use config::StoreConfig;
pub use engine::{LoadSource, StartupReport, Store, StoreBuilder};
pub use error::{LoadError, StoreError};
pub use history::NewCommand;
pub use performance::NewSample;
pub use retention::RetentionPolicy;
pub use schema::RepairReport;
pub use stats::StorageStats;
pub use types::*;
