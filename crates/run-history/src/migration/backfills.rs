//! Migrations over the bulk-actions table.

use super::iter::chunked_backfill_iterator;
use super::writer::insert_ignoring_conflict;
use super::{sql_backend, MigrationOptions, BACKFILL_JOB_NAME_AND_TAGS, BULK_ACTION_TYPES};
use crate::error::Result;
use crate::models::PartitionBackfill;
use crate::storage::RunStorage;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use tracing::info;

/// Fill `action_type` and `selector_id` on bulk-action rows written before
/// those columns existed.
///
/// Rows are addressed by their own row id. Rows that already have an action
/// type are never selected.
pub fn migrate_bulk_actions(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    let Some(sql) = sql_backend(storage, BULK_ACTION_TYPES) else {
        return Ok(());
    };
    options.message("Querying run storage.");

    let chunk_size = options.chunk_size;
    let mut cursor: i64 = 0;
    let mut has_more = chunk_size > 0;
    let mut updated = 0;

    while has_more {
        options.check_cancelled()?;
        let conn = sql.connect()?;

        let rows = untyped_bulk_actions(&conn, cursor, chunk_size)?;
        has_more = rows.len() >= chunk_size;

        for (storage_id, body) in &rows {
            let backfill: PartitionBackfill = serde_json::from_str(body)?;
            conn.execute(
                "UPDATE bulk_actions SET selector_id = ?1, action_type = ?2 WHERE id = ?3",
                params![
                    backfill.selector_id(),
                    backfill.bulk_action_type().as_str(),
                    storage_id
                ],
            )?;
            cursor = *storage_id;
            updated += 1;
        }

        if let Some(progress) = options.progress {
            progress.advance(rows.len());
        }
    }

    info!("Set action type on {} bulk actions", updated);
    Ok(())
}

fn untyped_bulk_actions(
    conn: &Connection,
    cursor: i64,
    limit: usize,
) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, body FROM bulk_actions
         WHERE action_type IS NULL AND id > ?1
         ORDER BY id ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![cursor, limit as i64], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Copy each backfill's tags into `backfill_tags` and its job name into the
/// indexed `job_name` column.
pub fn migrate_backfill_job_name_and_tags(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    let Some(sql) = sql_backend(storage, BACKFILL_JOB_NAME_AND_TAGS) else {
        return Ok(());
    };
    options.message("Querying run storage.");

    let mut tags_written = 0;
    let mut job_names = 0;
    for backfill in chunked_backfill_iterator(storage, options) {
        let backfill = backfill?;
        let conn = sql.connect()?;

        if !backfill.tags.is_empty() {
            tags_written += add_backfill_tags(&conn, &backfill.backfill_id, &backfill.tags)?;
        }
        if let Some(job_name) = &backfill.job_name {
            conn.execute(
                "UPDATE bulk_actions SET job_name = ?1 WHERE key = ?2",
                params![job_name, backfill.backfill_id],
            )?;
            job_names += 1;
        }
    }

    info!("Added {} backfill tags and {} job names", tags_written, job_names);
    Ok(())
}

fn add_backfill_tags(
    conn: &Connection,
    backfill_id: &str,
    tags: &BTreeMap<String, String>,
) -> Result<usize> {
    let mut written = 0;
    for (key, value) in tags {
        if insert_ignoring_conflict(
            conn,
            "INSERT INTO backfill_tags (backfill_id, key, value) VALUES (?1, ?2, ?3)",
            params![backfill_id, key, value],
        )? {
            written += 1;
        }
    }
    Ok(written)
}
