//! Run History - data migrations for pipeline run storage.
//!
//! This crate evolves a live store of runs, run tags and backfills when its
//! schema changes, and rebuilds derived state (start/end times, run assets)
//! from the event log. Migrations scan in bounded chunks keyed by the last
//! record seen, so they can run next to a process that keeps writing new
//! runs, and every write is safe to repeat after an interrupted run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use run_history::migration::{apply_required_migrations, LogProgress, MigrationOptions};
//! use run_history::{SqliteEventLogStorage, SqliteRunStorage};
//!
//! fn main() -> run_history::Result<()> {
//!     let event_log = Arc::new(SqliteEventLogStorage::open_at("/data/event_log.db".as_ref())?);
//!     let storage = SqliteRunStorage::open_at("/data/runs.db".as_ref(), event_log)?;
//!
//!     let progress = LogProgress::new();
//!     let options = MigrationOptions::default().with_progress(&progress);
//!     let applied = apply_required_migrations(&storage, &options, false)?;
//!     println!("Applied {} data migrations", applied.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod migration;
pub mod models;
pub mod storage;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::{MigrationConfig, StorageConfig};
pub use error::{Result, RunHistoryError};
pub use migration::{
    apply_migration, apply_optional_migrations, apply_required_migrations, MigrationOptions,
    MigrationProgress,
};
pub use models::{PartitionBackfill, Run, RunRecord, RunStatus};
pub use storage::{
    EventLogStorage, RunStorage, SqlRunStorage, SqliteEventLogStorage, SqliteRunStorage,
};
