//! Shared fixtures for migration integration tests.

#![allow(dead_code)]

use run_history::models::tags::{PARTITION_NAME_TAG, PARTITION_SET_TAG};
use run_history::models::{PartitionBackfill, Run, RunRecord, RunStatus};
use run_history::storage::{RunStorage, SqlRunStorage, SqliteEventLogStorage, SqliteRunStorage};
use run_history::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// File-backed run storage plus a handle on its event log.
pub struct TestInstance {
    pub storage: SqliteRunStorage,
    pub event_log: Arc<SqliteEventLogStorage>,
    _temp_dir: TempDir,
}

pub fn create_test_instance() -> TestInstance {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let event_log =
        Arc::new(SqliteEventLogStorage::open_at(&temp_dir.path().join("event_log.db")).unwrap());
    let storage =
        SqliteRunStorage::open_at(&temp_dir.path().join("runs.db"), event_log.clone()).unwrap();
    TestInstance {
        storage,
        event_log,
        _temp_dir: temp_dir,
    }
}

pub fn partitioned_run(run_id: &str) -> Run {
    Run::new(run_id, "etl", RunStatus::Success)
        .with_tag(PARTITION_NAME_TAG, format!("{}-partition", run_id))
        .with_tag(PARTITION_SET_TAG, "daily")
}

/// Run a raw statement against the storage connection.
pub fn execute(storage: &SqliteRunStorage, sql: &str) {
    storage.connect().unwrap().execute_batch(sql).unwrap();
}

/// One recorded paged read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub cursor: Option<String>,
    pub limit: usize,
    pub returned: usize,
}

#[derive(Debug, Default)]
struct Calls {
    get_runs: Vec<FetchCall>,
    get_runs_count: usize,
    get_backfills: Vec<FetchCall>,
    get_backfills_count: usize,
    add_run_tags: Vec<(String, BTreeMap<String, String>)>,
}

/// Run storage wrapper that records paged reads, counts and tag writes.
///
/// With `hide_sql` it reports no structured-query support, standing in for
/// a non-relational backend.
pub struct CountingStorage<'a> {
    inner: &'a SqliteRunStorage,
    hide_sql: bool,
    calls: Mutex<Calls>,
}

impl<'a> CountingStorage<'a> {
    pub fn new(inner: &'a SqliteRunStorage) -> Self {
        Self {
            inner,
            hide_sql: false,
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn non_relational(inner: &'a SqliteRunStorage) -> Self {
        Self {
            hide_sql: true,
            ..Self::new(inner)
        }
    }

    pub fn get_runs_calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().get_runs.clone()
    }

    pub fn get_runs_count_calls(&self) -> usize {
        self.calls.lock().unwrap().get_runs_count
    }

    pub fn get_backfills_calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().get_backfills.clone()
    }

    pub fn get_backfills_count_calls(&self) -> usize {
        self.calls.lock().unwrap().get_backfills_count
    }

    pub fn tagged_run_ids(&self) -> Vec<String> {
        let calls = self.calls.lock().unwrap();
        let mut ids: Vec<String> = calls.add_run_tags.iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }
}

impl RunStorage for CountingStorage<'_> {
    fn get_runs(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<Run>> {
        let runs = self.inner.get_runs(cursor, limit)?;
        self.calls.lock().unwrap().get_runs.push(FetchCall {
            cursor: cursor.map(str::to_string),
            limit,
            returned: runs.len(),
        });
        Ok(runs)
    }

    fn get_runs_count(&self) -> Result<usize> {
        self.calls.lock().unwrap().get_runs_count += 1;
        self.inner.get_runs_count()
    }

    fn get_run_records(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<RunRecord>> {
        self.inner.get_run_records(cursor, limit)
    }

    fn get_backfills(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<PartitionBackfill>> {
        let backfills = self.inner.get_backfills(cursor, limit)?;
        self.calls.lock().unwrap().get_backfills.push(FetchCall {
            cursor: cursor.map(str::to_string),
            limit,
            returned: backfills.len(),
        });
        Ok(backfills)
    }

    fn get_backfills_count(&self) -> Result<usize> {
        self.calls.lock().unwrap().get_backfills_count += 1;
        self.inner.get_backfills_count()
    }

    fn add_run_tags(&self, run_id: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .add_run_tags
            .push((run_id.to_string(), tags.clone()));
        self.inner.add_run_tags(run_id, tags)
    }

    fn has_built_index(&self, name: &str) -> Result<bool> {
        self.inner.has_built_index(name)
    }

    fn mark_index_built(&self, name: &str) -> Result<()> {
        self.inner.mark_index_built(name)
    }

    fn as_sql(&self) -> Option<&dyn SqlRunStorage> {
        if self.hide_sql {
            None
        } else {
            self.inner.as_sql()
        }
    }
}
