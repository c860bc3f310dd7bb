//! SQLite-backed event log.

use super::schema::EVENT_LOG_SCHEMA;
use super::sqlite::{open_connection, parse_timestamp};
use super::traits::EventLogStorage;
use crate::error::{RunHistoryError, Result};
use crate::models::{AssetKey, EventRecord, EventType, RunStats};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Append-only event log stored in SQLite.
///
/// Uses `Arc<Mutex<Connection>>` for thread safety within a process and WAL
/// mode for readers in other processes.
pub struct SqliteEventLogStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventLogStorage {
    /// Open the event log at a specific path, creating it if needed.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = open_connection(db_path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory event log.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(EVENT_LOG_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RunHistoryError::lock_poisoned("event log"))
    }

    /// Append an event, returning its storage id.
    pub fn store_event(&self, event: &EventRecord) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO event_logs (run_id, event_type, asset_key, step_key, timestamp, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.run_id,
                event.event_type.map(|t| t.as_str()),
                event.asset_key.as_ref().map(AssetKey::to_db_string),
                event.step_key,
                event.timestamp.to_rfc3339(),
                event.message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

type EventRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    chrono::DateTime<chrono::Utc>,
    String,
);

fn event_from_row(row: EventRow) -> Result<EventRecord> {
    let (run_id, event_type, asset_key, step_key, timestamp, message) = row;
    let event_type = event_type
        .map(|value| value.parse::<EventType>())
        .transpose()
        .map_err(RunHistoryError::Other)?;
    let asset_key = asset_key
        .map(|value| AssetKey::from_db_string(&value))
        .transpose()?;

    Ok(EventRecord {
        run_id,
        event_type,
        asset_key,
        step_key,
        timestamp,
        message,
    })
}

impl EventLogStorage for SqliteEventLogStorage {
    fn get_run_stats(&self, run_id: &str) -> Result<RunStats> {
        let events = self.get_events(run_id, &[])?;
        Ok(RunStats::from_events(run_id, &events))
    }

    fn get_events(&self, run_id: &str, of_types: &[EventType]) -> Result<Vec<EventRecord>> {
        let conn = self.lock_conn()?;

        let mut sql = String::from(
            "SELECT run_id, event_type, asset_key, step_key, timestamp, message
             FROM event_logs WHERE run_id = ?1",
        );
        if !of_types.is_empty() {
            let placeholders: Vec<String> =
                (0..of_types.len()).map(|i| format!("?{}", i + 2)).collect();
            sql.push_str(&format!(" AND event_type IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut values: Vec<&str> = Vec::with_capacity(of_types.len() + 1);
        values.push(run_id);
        for event_type in of_types {
            values.push(event_type.as_str());
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| -> rusqlite::Result<EventRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                parse_timestamp(&row.get::<_, String>(4)?)?,
                row.get(5)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(event_from_row(row?)?);
        }

        debug!("Loaded {} events for run {}", events.len(), run_id);
        Ok(events)
    }
}
