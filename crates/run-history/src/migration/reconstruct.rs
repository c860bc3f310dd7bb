//! Migrations that rebuild derived run state from the event log.

use super::iter::chunked_run_records_iterator;
use super::writer::insert_ignoring_conflict;
use super::{sql_backend, MigrationOptions, RUN_ASSETS, RUN_START_END};
use crate::error::Result;
use crate::models::{AssetKey, ASSET_EVENTS};
use crate::storage::{RunStorage, SqlRunStorage};
use rusqlite::params;
use std::collections::BTreeSet;
use tracing::info;

/// Recompute start and end times of every started run from the event log.
///
/// Existing values are overwritten: older writes were not always normalised
/// to UTC.
pub fn migrate_run_start_end(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    let Some(sql) = sql_backend(storage, RUN_START_END) else {
        return Ok(());
    };
    options.message("Querying run and event log storage.");

    let mut updated = 0;
    for record in chunked_run_records_iterator(storage, options) {
        let record = record?;
        if record.run.status.is_unstarted() {
            continue;
        }
        write_run_stats(sql, &record.run.run_id)?;
        updated += 1;
    }

    info!("Recomputed start and end times for {} runs", updated);
    Ok(())
}

/// Overwrite the stored start and end time of one run with the values
/// derived from its events. No-op on non-relational storage.
pub fn add_run_stats(storage: &dyn RunStorage, run_id: &str) -> Result<()> {
    match storage.as_sql() {
        Some(sql) => write_run_stats(sql, run_id),
        None => Ok(()),
    }
}

fn write_run_stats(sql: &dyn SqlRunStorage, run_id: &str) -> Result<()> {
    let stats = sql.event_log().get_run_stats(run_id)?;
    let conn = sql.connect()?;
    conn.execute(
        "UPDATE runs SET start_time = ?1, end_time = ?2 WHERE run_id = ?3",
        params![
            stats.start_time.map(|t| t.to_rfc3339()),
            stats.end_time.map(|t| t.to_rfc3339()),
            run_id,
        ],
    )?;
    Ok(())
}

/// Record which assets each started run touched, from its asset events.
pub fn migrate_run_assets(storage: &dyn RunStorage, options: &MigrationOptions<'_>) -> Result<()> {
    let Some(sql) = sql_backend(storage, RUN_ASSETS) else {
        return Ok(());
    };
    options.message("Querying run and event log storage.");

    let mut written = 0;
    for record in chunked_run_records_iterator(storage, options) {
        let record = record?;
        if record.run.status.is_unstarted() {
            continue;
        }
        written += add_run_assets(sql, &record.run.run_id)?;
    }

    info!("Recorded {} run asset associations", written);
    Ok(())
}

fn add_run_assets(sql: &dyn SqlRunStorage, run_id: &str) -> Result<usize> {
    let asset_keys: BTreeSet<AssetKey> = sql
        .event_log()
        .get_events(run_id, &ASSET_EVENTS)?
        .into_iter()
        .filter_map(|event| event.asset_key)
        .collect();
    if asset_keys.is_empty() {
        return Ok(0);
    }

    let conn = sql.connect()?;
    let mut written = 0;
    for asset_key in &asset_keys {
        if insert_ignoring_conflict(
            &conn,
            "INSERT INTO run_assets (run_id, asset_key) VALUES (?1, ?2)",
            params![run_id, asset_key.to_db_string()],
        )? {
            written += 1;
        }
    }
    Ok(written)
}
