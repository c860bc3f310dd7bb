//! Write path shared by migrations.
//!
//! Inserts that may collide with a row written by an earlier, interrupted
//! run go through [`insert_ignoring_conflict`]. Updates that recompute a
//! value unconditionally need no wrapper.

use crate::error::{is_unique_violation, Result};
use rusqlite::{Connection, Params};
use tracing::debug;

/// Execute an insert, treating a duplicate-key conflict as already done.
///
/// Returns `true` when a row was written and `false` when the conflict was
/// swallowed. Any other database error is returned.
pub fn insert_ignoring_conflict<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<bool> {
    match conn.execute(sql, params) {
        Ok(_) => Ok(true),
        Err(err) if is_unique_violation(&err) => {
            debug!("Row already present, skipping insert: {}", err);
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunHistoryError;
    use rusqlite::params;

    fn tag_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE run_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT,
                UNIQUE (run_id, key)
            );",
        )
        .unwrap();
        conn
    }

    const INSERT_TAG: &str = "INSERT INTO run_tags (run_id, key, value) VALUES (?1, ?2, ?3)";

    #[test]
    fn test_duplicate_insert_is_swallowed() {
        let conn = tag_table();
        assert!(insert_ignoring_conflict(&conn, INSERT_TAG, params!["r1", "k", "v1"]).unwrap());
        assert!(!insert_ignoring_conflict(&conn, INSERT_TAG, params!["r1", "k", "v2"]).unwrap());

        let value: String = conn
            .query_row("SELECT value FROM run_tags WHERE run_id = 'r1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(value, "v1");
    }

    #[test]
    fn test_other_constraint_errors_propagate() {
        let conn = tag_table();
        let err = insert_ignoring_conflict(
            &conn,
            INSERT_TAG,
            params![Option::<String>::None, "k", "v"],
        )
        .unwrap_err();
        assert!(matches!(err, RunHistoryError::Database { .. }));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_missing_table_propagates() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(insert_ignoring_conflict(&conn, INSERT_TAG, params!["r1", "k", "v"]).is_err());
    }
}
