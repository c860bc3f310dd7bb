//! Table definitions for the SQLite run and event-log stores.

/// Run storage tables.
///
/// `run_tags`, `backfill_tags` and `run_assets` carry unique constraints:
/// migrations rely on them to turn a repeated insert into a conflict that
/// the idempotent writer swallows.
pub const RUN_STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    job_name TEXT NOT NULL,
    status TEXT NOT NULL,
    run_body TEXT NOT NULL,
    partition_name TEXT,
    partition_set TEXT,
    backfill_id TEXT,
    create_timestamp TEXT NOT NULL,
    update_timestamp TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
CREATE INDEX IF NOT EXISTS idx_runs_partition ON runs(partition_set, partition_name);
CREATE INDEX IF NOT EXISTS idx_runs_backfill_id ON runs(backfill_id);

CREATE TABLE IF NOT EXISTS run_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT,
    UNIQUE (run_id, key)
);

CREATE INDEX IF NOT EXISTS idx_run_tags_key_value ON run_tags(key, value);

CREATE TABLE IF NOT EXISTS bulk_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    body TEXT NOT NULL,
    action_type TEXT,
    selector_id TEXT,
    job_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_bulk_actions_action_type ON bulk_actions(action_type);
CREATE INDEX IF NOT EXISTS idx_bulk_actions_selector_id ON bulk_actions(selector_id);
CREATE INDEX IF NOT EXISTS idx_bulk_actions_job_name ON bulk_actions(job_name);

CREATE TABLE IF NOT EXISTS backfill_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    backfill_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT,
    UNIQUE (backfill_id, key)
);

CREATE TABLE IF NOT EXISTS run_assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    asset_key TEXT NOT NULL,
    UNIQUE (run_id, asset_key)
);

CREATE INDEX IF NOT EXISTS idx_run_assets_asset_key ON run_assets(asset_key);

CREATE TABLE IF NOT EXISTS secondary_indexes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    create_timestamp TEXT NOT NULL,
    migration_completed TEXT
);
"#;

/// Event-log tables.
pub const EVENT_LOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS event_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    event_type TEXT,
    asset_key TEXT,
    step_key TEXT,
    timestamp TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_event_logs_run_id ON event_logs(run_id, id);
CREATE INDEX IF NOT EXISTS idx_event_logs_event_type ON event_logs(event_type);
"#;
