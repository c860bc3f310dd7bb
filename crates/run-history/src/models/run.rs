//! Run, run record and run origin types.

use super::tags::BACKFILL_ID_TAG;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    NotStarted,
    Managed,
    Starting,
    Started,
    Success,
    Failure,
    Canceling,
    Canceled,
}

/// Statuses of runs that have not begun executing. Their start and end
/// times cannot be reconstructed from the event log yet.
pub const UNSTARTED_RUN_STATUSES: [RunStatus; 4] = [
    RunStatus::Queued,
    RunStatus::NotStarted,
    RunStatus::Managed,
    RunStatus::Starting,
];

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::NotStarted => "NOT_STARTED",
            RunStatus::Managed => "MANAGED",
            RunStatus::Starting => "STARTING",
            RunStatus::Started => "STARTED",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
            RunStatus::Canceling => "CANCELING",
            RunStatus::Canceled => "CANCELED",
        }
    }

    /// Whether the run is still in the unstarted set.
    pub fn is_unstarted(&self) -> bool {
        UNSTARTED_RUN_STATUSES.contains(self)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a code location was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocationOrigin {
    pub location_name: String,
}

/// A repository inside a code location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOrigin {
    pub code_location_origin: CodeLocationOrigin,
    pub repository_name: String,
}

impl RepositoryOrigin {
    pub fn new(repository_name: impl Into<String>, location_name: impl Into<String>) -> Self {
        Self {
            code_location_origin: CodeLocationOrigin {
                location_name: location_name.into(),
            },
            repository_name: repository_name.into(),
        }
    }

    /// `repository@location`, the value stored under the repository label tag.
    pub fn label(&self) -> String {
        format!(
            "{}@{}",
            self.repository_name, self.code_location_origin.location_name
        )
    }
}

/// The job a run was launched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJobOrigin {
    pub repository_origin: RepositoryOrigin,
    pub job_name: String,
}

/// A single recorded execution of a job. Serialized as the run body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub job_name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub remote_job_origin: Option<RemoteJobOrigin>,
    #[serde(default)]
    pub parent_run_id: Option<String>,
    #[serde(default)]
    pub root_run_id: Option<String>,
}

impl Run {
    pub fn new(run_id: impl Into<String>, job_name: impl Into<String>, status: RunStatus) -> Self {
        Self {
            run_id: run_id.into(),
            job_name: job_name.into(),
            status,
            tags: BTreeMap::new(),
            remote_job_origin: None,
            parent_run_id: None,
            root_run_id: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_origin(mut self, origin: RemoteJobOrigin) -> Self {
        self.remote_job_origin = Some(origin);
        self
    }

    /// Backfill that launched this run, if any.
    pub fn backfill_id(&self) -> Option<&str> {
        self.tags.get(BACKFILL_ID_TAG).map(String::as_str)
    }

    /// Repository label derived from the remote origin.
    pub fn repository_label(&self) -> Option<String> {
        self.remote_job_origin
            .as_ref()
            .map(|origin| origin.repository_origin.label())
    }
}

/// A run plus the metadata the storage layer keeps about it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Internal, monotonically increasing row id.
    pub storage_id: i64,
    pub run: Run,
    pub create_timestamp: DateTime<Utc>,
    pub update_timestamp: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}
