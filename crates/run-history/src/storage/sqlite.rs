//! SQLite-backed run storage.

use super::event_log::SqliteEventLogStorage;
use super::schema::RUN_STORAGE_SCHEMA;
use super::traits::{ConnectionGuard, EventLogStorage, RunStorage, SqlRunStorage};
use crate::config::StorageConfig;
use crate::error::{RunHistoryError, Result};
use crate::models::tags::{PARTITION_NAME_TAG, PARTITION_SET_TAG};
use crate::models::{AssetKey, PartitionBackfill, Run, RunRecord};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Open a file-backed connection with the shared pragmas applied.
pub(crate) fn open_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RunHistoryError::io_with_path(e, parent))?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.busy_timeout(StorageConfig::busy_timeout())?;
    conn.execute_batch(&StorageConfig::connection_pragmas())?;
    Ok(conn)
}

/// Parse a stored RFC 3339 timestamp, normalising to UTC.
pub(crate) fn parse_timestamp(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a start or end time column.
///
/// Older stores wrote these as naive `YYYY-MM-DD HH:MM:SS[.f]` values in
/// UTC, or with a non-UTC offset. Both are accepted. Anything else reads as
/// unset so the start/end repair can rewrite it from the event log.
pub(crate) fn parse_recorded_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    warn!("Ignoring unparseable recorded time {:?}", value);
    None
}

/// Warn when a paged read after `cursor` came back empty because the cursor
/// row itself is gone. The id subquery then matches nothing and the scan
/// ends early instead of reaching the oldest rows.
fn warn_if_cursor_missing(
    conn: &Connection,
    table: &str,
    key_column: &str,
    cursor: Option<&str>,
) -> Result<()> {
    let Some(cursor) = cursor else {
        return Ok(());
    };
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)", table, key_column),
        params![cursor],
        |row| row.get(0),
    )?;
    if !exists {
        warn!("Cursor {} no longer exists in {}; paging stopped early", cursor, table);
    }
    Ok(())
}

/// Relational run storage.
///
/// Holds its connection as `Arc<Mutex<Connection>>`; [`SqlRunStorage::connect`]
/// hands out the guard so migrations can issue direct statements.
pub struct SqliteRunStorage {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    event_log: Arc<dyn EventLogStorage>,
}

impl SqliteRunStorage {
    /// Open run storage at a specific path, creating it if needed.
    pub fn open_at(db_path: &Path, event_log: Arc<dyn EventLogStorage>) -> Result<Self> {
        let conn = open_connection(db_path)?;
        Self::from_connection(conn, Some(db_path.to_path_buf()), event_log)
    }

    /// Open run storage and its event log side by side in `dir`.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        let event_log =
            SqliteEventLogStorage::open_at(&dir.join(StorageConfig::EVENT_LOG_DB_FILENAME))?;
        Self::open_at(&dir.join(StorageConfig::RUNS_DB_FILENAME), Arc::new(event_log))
    }

    /// Open private in-memory run storage.
    pub fn open_in_memory(event_log: Arc<dyn EventLogStorage>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None, event_log)
    }

    fn from_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        event_log: Arc<dyn EventLogStorage>,
    ) -> Result<Self> {
        conn.execute_batch(RUN_STORAGE_SCHEMA)?;
        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
            event_log,
        })
    }

    /// Database path, `None` for in-memory storage.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RunHistoryError::lock_poisoned("run storage"))
    }

    // ========================================
    // Writes used by the live system
    // ========================================

    /// Store a new run with its tags. Returns the internal row id.
    pub fn add_run(&self, run: &Run) -> Result<i64> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let body = serde_json::to_string(run)?;

        tx.execute(
            "INSERT INTO runs (run_id, job_name, status, run_body, partition_name, partition_set,
                               backfill_id, create_timestamp, update_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                run.run_id,
                run.job_name,
                run.status.as_str(),
                body,
                run.tags.get(PARTITION_NAME_TAG),
                run.tags.get(PARTITION_SET_TAG),
                run.backfill_id(),
                now,
            ],
        )?;
        let storage_id = tx.last_insert_rowid();

        for (key, value) in &run.tags {
            tx.execute(
                "INSERT INTO run_tags (run_id, key, value) VALUES (?1, ?2, ?3)",
                params![run.run_id, key, value],
            )?;
        }

        tx.commit()?;
        debug!("Stored run {} (id {})", run.run_id, storage_id);
        Ok(storage_id)
    }

    /// Store a new backfill with its indexed columns and tags. Returns the
    /// internal row id.
    pub fn add_backfill(&self, backfill: &PartitionBackfill) -> Result<i64> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let body = serde_json::to_string(backfill)?;

        tx.execute(
            "INSERT INTO bulk_actions
                 (key, status, timestamp, body, action_type, selector_id, job_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                backfill.backfill_id,
                backfill.status.as_str(),
                Utc::now().to_rfc3339(),
                body,
                backfill.bulk_action_type().as_str(),
                backfill.selector_id(),
                backfill.job_name,
            ],
        )?;
        let storage_id = tx.last_insert_rowid();

        for (key, value) in &backfill.tags {
            tx.execute(
                "INSERT INTO backfill_tags (backfill_id, key, value) VALUES (?1, ?2, ?3)",
                params![backfill.backfill_id, key, value],
            )?;
        }

        tx.commit()?;
        debug!("Stored backfill {} (id {})", backfill.backfill_id, storage_id);
        Ok(storage_id)
    }

    // ========================================
    // Point reads
    // ========================================

    pub fn get_run_by_id(&self, run_id: &str) -> Result<Option<Run>> {
        let conn = self.lock_conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT run_body FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Tags as stored in the tag index.
    pub fn get_run_tags(&self, run_id: &str) -> Result<BTreeMap<String, String>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM run_tags WHERE run_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut tags = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            tags.insert(key, value.unwrap_or_default());
        }
        Ok(tags)
    }

    pub fn get_backfill_tags(&self, backfill_id: &str) -> Result<BTreeMap<String, String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM backfill_tags WHERE backfill_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![backfill_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut tags = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            tags.insert(key, value.unwrap_or_default());
        }
        Ok(tags)
    }

    /// Assets recorded as touched by a run, ordered by key.
    pub fn get_run_assets(&self, run_id: &str) -> Result<Vec<AssetKey>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT asset_key FROM run_assets WHERE run_id = ?1 ORDER BY asset_key")?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(AssetKey::from_db_string(&row?)?);
        }
        Ok(assets)
    }
}

impl RunStorage for SqliteRunStorage {
    fn get_runs(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<Run>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_body FROM runs
             WHERE ?1 IS NULL OR id < (SELECT id FROM runs WHERE run_id = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cursor, limit as i64], |row| row.get::<_, String>(0))?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(serde_json::from_str(&row?)?);
        }
        if runs.is_empty() {
            warn_if_cursor_missing(&conn, "runs", "run_id", cursor)?;
        }
        Ok(runs)
    }

    fn get_runs_count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_run_records(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_body, create_timestamp, update_timestamp, start_time, end_time
             FROM runs
             WHERE ?1 IS NULL OR id < (SELECT id FROM runs WHERE run_id = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cursor, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                parse_timestamp(&row.get::<_, String>(2)?)?,
                parse_timestamp(&row.get::<_, String>(3)?)?,
                parse_recorded_time(row.get::<_, Option<String>>(4)?.as_deref()),
                parse_recorded_time(row.get::<_, Option<String>>(5)?.as_deref()),
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (storage_id, body, create_timestamp, update_timestamp, start_time, end_time) = row?;
            records.push(RunRecord {
                storage_id,
                run: serde_json::from_str(&body)?,
                create_timestamp,
                update_timestamp,
                start_time,
                end_time,
            });
        }
        if records.is_empty() {
            warn_if_cursor_missing(&conn, "runs", "run_id", cursor)?;
        }
        Ok(records)
    }

    fn get_backfills(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PartitionBackfill>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM bulk_actions
             WHERE ?1 IS NULL OR id < (SELECT id FROM bulk_actions WHERE key = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cursor, limit as i64], |row| row.get::<_, String>(0))?;

        let mut backfills = Vec::new();
        for row in rows {
            backfills.push(serde_json::from_str(&row?)?);
        }
        if backfills.is_empty() {
            warn_if_cursor_missing(&conn, "bulk_actions", "key", cursor)?;
        }
        Ok(backfills)
    }

    fn get_backfills_count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM bulk_actions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn add_run_tags(&self, run_id: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT run_body FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            return Err(RunHistoryError::RunNotFound {
                run_id: run_id.to_string(),
            });
        };
        let mut run: Run = serde_json::from_str(&body)?;

        for (key, value) in tags {
            tx.execute(
                "INSERT INTO run_tags (run_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(run_id, key) DO UPDATE SET value = excluded.value",
                params![run_id, key, value],
            )?;
            run.tags.insert(key.clone(), value.clone());
        }

        tx.execute(
            "UPDATE runs
             SET run_body = ?1, partition_name = ?2, partition_set = ?3, update_timestamp = ?4
             WHERE run_id = ?5",
            params![
                serde_json::to_string(&run)?,
                run.tags.get(PARTITION_NAME_TAG),
                run.tags.get(PARTITION_SET_TAG),
                Utc::now().to_rfc3339(),
                run_id,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn has_built_index(&self, name: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let completed: Option<Option<String>> = conn
            .query_row(
                "SELECT migration_completed FROM secondary_indexes WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(matches!(completed, Some(Some(_))))
    }

    fn mark_index_built(&self, name: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO secondary_indexes (name, create_timestamp, migration_completed)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(name) DO UPDATE SET migration_completed = excluded.migration_completed",
            params![name, now],
        )?;
        debug!("Marked data migration {} as applied", name);
        Ok(())
    }

    fn as_sql(&self) -> Option<&dyn SqlRunStorage> {
        Some(self)
    }
}

impl SqlRunStorage for SqliteRunStorage {
    fn connect(&self) -> Result<ConnectionGuard<'_>> {
        Ok(Box::new(self.lock_conn()?))
    }

    fn event_log(&self) -> &dyn EventLogStorage {
        self.event_log.as_ref()
    }
}
