//! Centralized configuration for run history storage and migrations.
//!
//! Tunables are associated constants so callers and tests reference the same
//! values. Per-invocation settings live in
//! [`MigrationOptions`](crate::migration::MigrationOptions).

use std::time::Duration;

/// Configuration for data migrations.
pub struct MigrationConfig;

impl MigrationConfig {
    /// Records fetched per chunk when the caller does not override it.
    pub const DEFAULT_CHUNK_SIZE: usize = 100;
}

/// Configuration for the SQLite run and event-log stores.
pub struct StorageConfig;

impl StorageConfig {
    pub const BUSY_TIMEOUT_MS: u64 = 30_000;
    pub const RUNS_DB_FILENAME: &'static str = "runs.db";
    pub const EVENT_LOG_DB_FILENAME: &'static str = "event_log.db";
}

impl StorageConfig {
    pub fn busy_timeout() -> Duration {
        Duration::from_millis(Self::BUSY_TIMEOUT_MS)
    }

    /// Pragmas applied to every connection: WAL for concurrent readers while a
    /// live writer keeps inserting runs.
    pub fn connection_pragmas() -> String {
        format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA temp_store=MEMORY;",
            Self::BUSY_TIMEOUT_MS,
        )
    }
}
