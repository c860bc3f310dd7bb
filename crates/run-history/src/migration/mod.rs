//! Data migrations over run and backfill history.
//!
//! Each migration streams records in bounded chunks, derives the value a
//! newer schema expects, and writes it back in a way that is safe to
//! repeat. Cursors are never persisted: an interrupted migration is simply
//! run again from the start.

mod backfills;
pub mod iter;
pub mod progress;
mod reconstruct;
pub mod registry;
mod runner;
mod runs;
pub mod writer;

use crate::cancel::CancellationToken;
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::storage::{RunStorage, SqlRunStorage};
use tracing::debug;

pub use backfills::{migrate_backfill_job_name_and_tags, migrate_bulk_actions};
pub use iter::{
    chunked_backfill_iterator, chunked_run_iterator, chunked_run_records_iterator,
    ChunkedCursorIter,
};
pub use progress::{LogProgress, MigrationProgress, ProgressSnapshot, ProgressTracker};
pub use reconstruct::{add_run_stats, migrate_run_assets, migrate_run_start_end};
pub use registry::{
    find_migration, optional_migration, required_migration, DataMigration, MigrationFn,
    BACKFILL_JOB_NAME_AND_TAGS, BULK_ACTION_TYPES, OPTIONAL_DATA_MIGRATIONS,
    REQUIRED_DATA_MIGRATIONS, RUN_ASSETS, RUN_BACKFILL_ID, RUN_PARTITIONS,
    RUN_REPO_LABEL_TAGS, RUN_START_END,
};
pub use runner::{apply_migration, apply_optional_migrations, apply_required_migrations};
pub use runs::{migrate_run_backfill_id, migrate_run_partitions, migrate_run_repo_tags};

/// Per-invocation settings shared by every migration.
#[derive(Clone, Copy)]
pub struct MigrationOptions<'a> {
    /// Receives total and processed counts. `None` skips the count query.
    pub progress: Option<&'a dyn MigrationProgress>,
    /// Records fetched per chunk. Zero means nothing is read.
    pub chunk_size: usize,
    /// Checked before each chunk fetch.
    pub cancel: Option<&'a CancellationToken>,
}

impl Default for MigrationOptions<'_> {
    fn default() -> Self {
        Self {
            progress: None,
            chunk_size: MigrationConfig::DEFAULT_CHUNK_SIZE,
            cancel: None,
        }
    }
}

impl<'a> MigrationOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: &'a dyn MigrationProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_cancellation(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn message(&self, message: &str) {
        if let Some(progress) = self.progress {
            progress.message(message);
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MigrationOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationOptions")
            .field("progress", &self.progress.is_some())
            .field("chunk_size", &self.chunk_size)
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Relational capability of `storage`, or `None` (logged) when the
/// migration has nothing to do on this backend.
pub(crate) fn sql_backend<'s>(
    storage: &'s dyn RunStorage,
    migration: &str,
) -> Option<&'s dyn SqlRunStorage> {
    let sql = storage.as_sql();
    if sql.is_none() {
        debug!(
            "Skipping data migration {}: storage has no structured-query support",
            migration
        );
    }
    sql
}
