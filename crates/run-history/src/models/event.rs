//! Event-log types used to reconstruct derived run state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies an asset by its path segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub path: Vec<String>,
}

impl AssetKey {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Stable string form stored in the database (a JSON array of segments).
    pub fn to_db_string(&self) -> String {
        serde_json::to_string(&self.path).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_db_string(value: &str) -> serde_json::Result<Self> {
        Ok(Self {
            path: serde_json::from_str(value)?,
        })
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("/"))
    }
}

/// Kinds of structured events recorded while a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunEnqueued,
    RunStarting,
    RunStart,
    RunSuccess,
    RunFailure,
    RunCanceled,
    StepStart,
    StepSuccess,
    StepFailure,
    AssetMaterialization,
    AssetObservation,
    AssetMaterializationPlanned,
}

/// Event types that reference an asset.
pub const ASSET_EVENTS: [EventType; 3] = [
    EventType::AssetMaterialization,
    EventType::AssetObservation,
    EventType::AssetMaterializationPlanned,
];

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RunEnqueued => "RUN_ENQUEUED",
            EventType::RunStarting => "RUN_STARTING",
            EventType::RunStart => "RUN_START",
            EventType::RunSuccess => "RUN_SUCCESS",
            EventType::RunFailure => "RUN_FAILURE",
            EventType::RunCanceled => "RUN_CANCELED",
            EventType::StepStart => "STEP_START",
            EventType::StepSuccess => "STEP_SUCCESS",
            EventType::StepFailure => "STEP_FAILURE",
            EventType::AssetMaterialization => "ASSET_MATERIALIZATION",
            EventType::AssetObservation => "ASSET_OBSERVATION",
            EventType::AssetMaterializationPlanned => "ASSET_MATERIALIZATION_PLANNED",
        }
    }

    /// Events that end a run.
    pub fn is_run_terminal(&self) -> bool {
        matches!(
            self,
            EventType::RunSuccess | EventType::RunFailure | EventType::RunCanceled
        )
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUN_ENQUEUED" => Ok(EventType::RunEnqueued),
            "RUN_STARTING" => Ok(EventType::RunStarting),
            "RUN_START" => Ok(EventType::RunStart),
            "RUN_SUCCESS" => Ok(EventType::RunSuccess),
            "RUN_FAILURE" => Ok(EventType::RunFailure),
            "RUN_CANCELED" => Ok(EventType::RunCanceled),
            "STEP_START" => Ok(EventType::StepStart),
            "STEP_SUCCESS" => Ok(EventType::StepSuccess),
            "STEP_FAILURE" => Ok(EventType::StepFailure),
            "ASSET_MATERIALIZATION" => Ok(EventType::AssetMaterialization),
            "ASSET_OBSERVATION" => Ok(EventType::AssetObservation),
            "ASSET_MATERIALIZATION_PLANNED" => Ok(EventType::AssetMaterializationPlanned),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// One entry in the append-only event log. Plain log messages have no
/// event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub run_id: String,
    pub event_type: Option<EventType>,
    pub asset_key: Option<AssetKey>,
    pub step_key: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl EventRecord {
    pub fn new(run_id: impl Into<String>, event_type: EventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            event_type: Some(event_type),
            asset_key: None,
            step_key: None,
            timestamp,
            message: String::new(),
        }
    }

    pub fn with_asset_key(mut self, asset_key: AssetKey) -> Self {
        self.asset_key = Some(asset_key);
        self
    }

    pub fn with_step_key(mut self, step_key: impl Into<String>) -> Self {
        self.step_key = Some(step_key.into());
        self
    }
}

/// Run statistics derived from the event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: String,
    pub launch_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub steps_succeeded: u32,
    pub steps_failed: u32,
    pub materializations: u32,
}

impl RunStats {
    /// Fold events, in log order, into run statistics.
    pub fn from_events<'a>(
        run_id: &str,
        events: impl IntoIterator<Item = &'a EventRecord>,
    ) -> Self {
        let mut stats = RunStats {
            run_id: run_id.to_string(),
            ..Default::default()
        };

        for event in events {
            let Some(event_type) = event.event_type else {
                continue;
            };
            match event_type {
                EventType::RunStarting => stats.launch_time = Some(event.timestamp),
                EventType::RunStart => stats.start_time = Some(event.timestamp),
                EventType::StepSuccess => stats.steps_succeeded += 1,
                EventType::StepFailure => stats.steps_failed += 1,
                EventType::AssetMaterialization => stats.materializations += 1,
                t if t.is_run_terminal() => stats.end_time = Some(event.timestamp),
                _ => {}
            }
        }

        stats
    }
}
