//! Reserved tag keys.
//!
//! These keys are persisted in run and backfill tag tables and must never be
//! renamed once written.

/// Prefix shared by every tag key the system writes itself.
pub const SYSTEM_TAG_PREFIX: &str = "system/";

/// Partition a run materializes.
pub const PARTITION_NAME_TAG: &str = "system/partition";

/// Partition set the partition belongs to.
pub const PARTITION_SET_TAG: &str = "system/partition_set";

/// Backfill that launched a run.
pub const BACKFILL_ID_TAG: &str = "system/backfill";

/// `repository@location` label of the code that launched a run.
pub const REPOSITORY_LABEL_TAG: &str = "system/repository";

/// Whether a tag key is reserved for system use.
pub fn is_system_tag(key: &str) -> bool {
    key.starts_with(SYSTEM_TAG_PREFIX)
}
