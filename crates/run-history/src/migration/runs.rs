//! Migrations that rebuild run indexes from stored runs.

use super::iter::chunked_run_iterator;
use super::writer::insert_ignoring_conflict;
use super::{sql_backend, MigrationOptions, RUN_BACKFILL_ID, RUN_PARTITIONS, RUN_REPO_LABEL_TAGS};
use crate::error::Result;
use crate::models::tags::{PARTITION_NAME_TAG, PARTITION_SET_TAG, REPOSITORY_LABEL_TAG};
use crate::models::Run;
use crate::storage::RunStorage;
use rusqlite::{params, Connection};
use tracing::info;

/// Rewrite the tags of every partitioned run so the partition index covers
/// runs stored before it existed.
pub fn migrate_run_partitions(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    if sql_backend(storage, RUN_PARTITIONS).is_none() {
        return Ok(());
    }
    options.message("Querying run storage.");

    let mut updated = 0;
    for run in chunked_run_iterator(storage, options) {
        let run = run?;
        if !run.tags.contains_key(PARTITION_NAME_TAG) || !run.tags.contains_key(PARTITION_SET_TAG) {
            continue;
        }
        storage.add_run_tags(&run.run_id, &run.tags)?;
        updated += 1;
    }

    info!("Reindexed partition tags for {} runs", updated);
    Ok(())
}

/// Add the repository label tag to runs that do not carry one yet.
///
/// Scans with an anti-join against the tag table in row-id order, one
/// connection scope per chunk.
pub fn migrate_run_repo_tags(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    let Some(sql) = sql_backend(storage, RUN_REPO_LABEL_TAGS) else {
        return Ok(());
    };
    options.message("Querying run storage.");

    let chunk_size = options.chunk_size;
    let mut cursor: i64 = 0;
    let mut has_more = chunk_size > 0;
    let mut written = 0;

    while has_more {
        options.check_cancelled()?;
        let conn = sql.connect()?;

        let rows = untagged_runs(&conn, cursor, chunk_size)?;
        has_more = rows.len() >= chunk_size;

        for (storage_id, body) in &rows {
            let run: Run = serde_json::from_str(body)?;
            cursor = *storage_id;
            if write_repo_tag(&conn, &run)? {
                written += 1;
            }
        }

        if let Some(progress) = options.progress {
            progress.advance(rows.len());
        }
    }

    info!("Added repository label tags to {} runs", written);
    Ok(())
}

fn untagged_runs(conn: &Connection, cursor: i64, limit: usize) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT runs.id, runs.run_body
         FROM runs
         LEFT OUTER JOIN (
             SELECT run_id AS tags_run_id FROM run_tags WHERE key = ?1
         ) AS tag_subquery ON runs.run_id = tag_subquery.tags_run_id
         WHERE tag_subquery.tags_run_id IS NULL AND runs.id > ?2
         ORDER BY runs.id ASC
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![REPOSITORY_LABEL_TAG, cursor, limit as i64], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Insert the repository label tag for `run`. Runs without a remote origin
/// have no label and are left alone.
fn write_repo_tag(conn: &Connection, run: &Run) -> Result<bool> {
    let Some(label) = run.repository_label() else {
        return Ok(false);
    };
    insert_ignoring_conflict(
        conn,
        "INSERT INTO run_tags (run_id, key, value) VALUES (?1, ?2, ?3)",
        params![run.run_id, REPOSITORY_LABEL_TAG, label],
    )
}

/// Promote the backfill id tag into the indexed `backfill_id` column.
pub fn migrate_run_backfill_id(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    let Some(sql) = sql_backend(storage, RUN_BACKFILL_ID) else {
        return Ok(());
    };
    options.message("Querying run storage.");

    let mut updated = 0;
    for run in chunked_run_iterator(storage, options) {
        let run = run?;
        let Some(backfill_id) = run.backfill_id() else {
            continue;
        };

        let conn = sql.connect()?;
        conn.execute(
            "UPDATE runs SET backfill_id = ?1 WHERE run_id = ?2",
            params![backfill_id, run.run_id],
        )?;
        updated += 1;
    }

    info!("Set backfill id column on {} runs", updated);
    Ok(())
}
