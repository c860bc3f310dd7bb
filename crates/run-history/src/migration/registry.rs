//! Catalog of data migrations by stable name.
//!
//! Names are persisted as applied markers. Never rename one once shipped.

use super::{
    migrate_backfill_job_name_and_tags, migrate_bulk_actions, migrate_run_assets,
    migrate_run_backfill_id, migrate_run_partitions, migrate_run_repo_tags,
    migrate_run_start_end, MigrationOptions,
};
use crate::error::Result;
use crate::storage::RunStorage;

pub const RUN_PARTITIONS: &str = "run_partitions";
/// Formerly `run_start_end`; renamed so stores that ran it re-run it and
/// overwrite timestamps written before they were normalised to UTC.
pub const RUN_START_END: &str = "run_start_end_overwritten";
pub const RUN_REPO_LABEL_TAGS: &str = "run_repo_label_tags";
pub const BULK_ACTION_TYPES: &str = "bulk_action_types";
pub const RUN_BACKFILL_ID: &str = "run_backfill_id";
pub const BACKFILL_JOB_NAME_AND_TAGS: &str = "backfill_job_name_and_tags";
pub const RUN_ASSETS: &str = "run_assets";

/// Signature shared by every data migration.
pub type MigrationFn = fn(&dyn RunStorage, &MigrationOptions<'_>) -> Result<()>;

/// A named data migration.
#[derive(Clone, Copy)]
pub struct DataMigration {
    pub name: &'static str,
    pub run: MigrationFn,
}

impl std::fmt::Debug for DataMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataMigration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Applied with schema upgrades, in this order.
pub const REQUIRED_DATA_MIGRATIONS: &[DataMigration] = &[
    DataMigration {
        name: RUN_PARTITIONS,
        run: migrate_run_partitions,
    },
    DataMigration {
        name: RUN_REPO_LABEL_TAGS,
        run: migrate_run_repo_tags,
    },
    DataMigration {
        name: BULK_ACTION_TYPES,
        run: migrate_bulk_actions,
    },
    DataMigration {
        name: RUN_BACKFILL_ID,
        run: migrate_run_backfill_id,
    },
    DataMigration {
        name: BACKFILL_JOB_NAME_AND_TAGS,
        run: migrate_backfill_job_name_and_tags,
    },
];

/// Read-performance indexes; safe to skip or re-run.
pub const OPTIONAL_DATA_MIGRATIONS: &[DataMigration] = &[
    DataMigration {
        name: RUN_START_END,
        run: migrate_run_start_end,
    },
    DataMigration {
        name: RUN_ASSETS,
        run: migrate_run_assets,
    },
];

pub fn required_migration(name: &str) -> Option<&'static DataMigration> {
    REQUIRED_DATA_MIGRATIONS.iter().find(|m| m.name == name)
}

pub fn optional_migration(name: &str) -> Option<&'static DataMigration> {
    OPTIONAL_DATA_MIGRATIONS.iter().find(|m| m.name == name)
}

/// Look a name up in the required set, then the optional set.
pub fn find_migration(name: &str) -> Option<&'static DataMigration> {
    required_migration(name).or_else(|| optional_migration(name))
}
