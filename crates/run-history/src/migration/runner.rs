//! Applying registered migrations and recording them as applied.

use super::registry::{
    find_migration, DataMigration, OPTIONAL_DATA_MIGRATIONS, REQUIRED_DATA_MIGRATIONS,
};
use super::MigrationOptions;
use crate::error::{Result, RunHistoryError};
use crate::storage::RunStorage;
use tracing::{info, warn};

/// Apply every required migration not yet marked as applied, in
/// registration order. With `force`, markers are ignored and everything
/// runs again.
///
/// Returns the names that ran. Stops at the first failure; the failed
/// migration stays unmarked.
pub fn apply_required_migrations(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
    force: bool,
) -> Result<Vec<&'static str>> {
    apply_all(storage, REQUIRED_DATA_MIGRATIONS, options, force)
}

/// Apply the optional (reindex) migrations, same rules as
/// [`apply_required_migrations`].
pub fn apply_optional_migrations(
    storage: &dyn RunStorage,
    options: &MigrationOptions<'_>,
    force: bool,
) -> Result<Vec<&'static str>> {
    apply_all(storage, OPTIONAL_DATA_MIGRATIONS, options, force)
}

/// Run one migration by name, regardless of its marker, and mark it
/// applied.
pub fn apply_migration(
    storage: &dyn RunStorage,
    name: &str,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    let migration = find_migration(name).ok_or_else(|| RunHistoryError::UnknownMigration {
        name: name.to_string(),
    })?;
    run_and_mark(storage, migration, options)
}

fn apply_all(
    storage: &dyn RunStorage,
    migrations: &'static [DataMigration],
    options: &MigrationOptions<'_>,
    force: bool,
) -> Result<Vec<&'static str>> {
    let mut applied = Vec::new();
    for migration in migrations {
        if !force && storage.has_built_index(migration.name)? {
            info!("Data migration {} already applied", migration.name);
            continue;
        }
        run_and_mark(storage, migration, options)?;
        applied.push(migration.name);
    }
    Ok(applied)
}

fn run_and_mark(
    storage: &dyn RunStorage,
    migration: &DataMigration,
    options: &MigrationOptions<'_>,
) -> Result<()> {
    info!("Applying data migration {}", migration.name);
    options.message(&format!("Starting data migration: {}", migration.name));

    if let Err(e) = (migration.run)(storage, options) {
        warn!("Data migration {} failed: {}", migration.name, e);
        return Err(e);
    }

    storage.mark_index_built(migration.name)?;
    info!("Finished data migration {}", migration.name);
    Ok(())
}
