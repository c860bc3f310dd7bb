//! Data model for runs, backfills and event-log entries.

pub mod backfill;
pub mod event;
pub mod run;
pub mod tags;

pub use backfill::{BulkActionStatus, BulkActionType, PartitionBackfill, PartitionSetOrigin};
pub use event::{AssetKey, EventRecord, EventType, RunStats, ASSET_EVENTS};
pub use run::{
    CodeLocationOrigin, RemoteJobOrigin, RepositoryOrigin, Run, RunRecord, RunStatus,
    UNSTARTED_RUN_STATUSES,
};
