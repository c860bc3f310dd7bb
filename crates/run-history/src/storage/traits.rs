//! Storage contracts consumed by the migration engine.

use crate::error::Result;
use crate::models::{EventRecord, EventType, PartitionBackfill, Run, RunRecord, RunStats};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::ops::DerefMut;

/// Scoped access to a relational backend's connection. The connection is
/// released when the guard drops, on every exit path.
///
/// Backends choose their own guard: a mutex guard, a pooled connection, or
/// anything else that derefs to a [`Connection`].
pub type ConnectionGuard<'a> = Box<dyn DerefMut<Target = Connection> + 'a>;

/// Run storage as seen by data migrations.
///
/// Paginated reads return records newest-first. `cursor` is the identifier
/// of the last record the caller has seen; the next page holds only records
/// stored before it, so rows inserted concurrently by a live writer never
/// shift a page that is already being scanned.
pub trait RunStorage: Send + Sync {
    /// Fetch up to `limit` runs stored before `cursor`.
    fn get_runs(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<Run>>;

    fn get_runs_count(&self) -> Result<usize>;

    /// Same paging as [`RunStorage::get_runs`], with storage metadata.
    fn get_run_records(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<RunRecord>>;

    /// Fetch up to `limit` backfills stored before the backfill id `cursor`.
    fn get_backfills(&self, cursor: Option<&str>, limit: usize)
        -> Result<Vec<PartitionBackfill>>;

    fn get_backfills_count(&self) -> Result<usize>;

    /// Add or overwrite tags on a run. Keys stay unique per run.
    fn add_run_tags(&self, run_id: &str, tags: &BTreeMap<String, String>) -> Result<()>;

    /// Whether the named data migration has been recorded as applied.
    fn has_built_index(&self, name: &str) -> Result<bool>;

    /// Record the named data migration as applied.
    fn mark_index_built(&self, name: &str) -> Result<()>;

    /// Structured-query capability. Non-relational backends return `None`
    /// and every data migration becomes a no-op against them.
    fn as_sql(&self) -> Option<&dyn SqlRunStorage> {
        None
    }
}

/// Capability exposed only by relational run storage.
pub trait SqlRunStorage {
    /// Acquire the connection for direct reads and writes.
    fn connect(&self) -> Result<ConnectionGuard<'_>>;

    /// Event log of the same instance, the authoritative source for
    /// reconstructed fields.
    fn event_log(&self) -> &dyn EventLogStorage;
}

/// Read access to the append-only event log.
pub trait EventLogStorage: Send + Sync {
    /// Statistics for a run computed from its lifecycle events.
    fn get_run_stats(&self, run_id: &str) -> Result<RunStats>;

    /// Events of a run in log order. An empty `of_types` returns every event.
    fn get_events(&self, run_id: &str, of_types: &[EventType]) -> Result<Vec<EventRecord>>;
}
