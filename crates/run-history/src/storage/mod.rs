//! Run and event-log storage.
//!
//! Migrations only see [`RunStorage`] and its capability traits; the SQLite
//! types are the relational backend shipped with the crate.

mod event_log;
pub mod schema;
mod sqlite;
mod traits;

pub use event_log::SqliteEventLogStorage;
pub use sqlite::SqliteRunStorage;
pub use traits::{ConnectionGuard, EventLogStorage, RunStorage, SqlRunStorage};
