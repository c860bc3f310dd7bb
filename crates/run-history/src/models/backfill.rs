//! Backfill (bulk action) types.

use super::event::AssetKey;
use super::run::RepositoryOrigin;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of bulk action backing a row in the bulk-actions index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkActionType {
    PartitionBackfill,
    MultiRunAssetAction,
}

impl BulkActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkActionType::PartitionBackfill => "PARTITION_BACKFILL",
            BulkActionType::MultiRunAssetAction => "MULTI_RUN_ASSET_ACTION",
        }
    }
}

impl fmt::Display for BulkActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkActionStatus {
    Requested,
    Completed,
    Failed,
    Canceling,
    Canceled,
}

impl BulkActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkActionStatus::Requested => "REQUESTED",
            BulkActionStatus::Completed => "COMPLETED",
            BulkActionStatus::Failed => "FAILED",
            BulkActionStatus::Canceling => "CANCELING",
            BulkActionStatus::Canceled => "CANCELED",
        }
    }
}

/// The partition set a job backfill targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSetOrigin {
    pub repository_origin: RepositoryOrigin,
    pub partition_set_name: String,
}

impl PartitionSetOrigin {
    /// Stable selector id: hex SHA-256 of the serialized origin.
    pub fn selector_id(&self) -> String {
        // Struct field order is fixed, so the JSON form is deterministic.
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&serialized))
    }
}

/// A batch (re)materialization across many partitions. Serialized as the
/// bulk-action body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionBackfill {
    pub backfill_id: String,
    pub status: BulkActionStatus,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub partition_set_origin: Option<PartitionSetOrigin>,
    #[serde(default)]
    pub asset_selection: Option<Vec<AssetKey>>,
    #[serde(default)]
    pub partition_names: Option<Vec<String>>,
    #[serde(default)]
    pub from_failure: bool,
    /// Seconds since the epoch when the backfill was requested.
    pub backfill_timestamp: f64,
}

impl PartitionBackfill {
    pub fn new(backfill_id: impl Into<String>, backfill_timestamp: f64) -> Self {
        Self {
            backfill_id: backfill_id.into(),
            status: BulkActionStatus::Requested,
            job_name: None,
            tags: BTreeMap::new(),
            partition_set_origin: None,
            asset_selection: None,
            partition_names: None,
            from_failure: false,
            backfill_timestamp,
        }
    }

    pub fn bulk_action_type(&self) -> BulkActionType {
        if self.asset_selection.is_some() {
            BulkActionType::MultiRunAssetAction
        } else {
            BulkActionType::PartitionBackfill
        }
    }

    /// Deduplication key in the bulk-actions index; `None` for asset backfills
    /// with no partition set.
    pub fn selector_id(&self) -> Option<String> {
        self.partition_set_origin
            .as_ref()
            .map(PartitionSetOrigin::selector_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(name: &str) -> PartitionSetOrigin {
        PartitionSetOrigin {
            repository_origin: RepositoryOrigin::new("analytics", "warehouse"),
            partition_set_name: name.to_string(),
        }
    }

    #[test]
    fn test_selector_id_is_stable_and_distinct() {
        let a = origin("daily");
        assert_eq!(a.selector_id(), origin("daily").selector_id());
        assert_ne!(a.selector_id(), origin("hourly").selector_id());
        assert_eq!(a.selector_id().len(), 64);
    }

    #[test]
    fn test_bulk_action_type() {
        let mut backfill = PartitionBackfill::new("b1", 0.0);
        backfill.partition_set_origin = Some(origin("daily"));
        assert_eq!(backfill.bulk_action_type(), BulkActionType::PartitionBackfill);
        assert!(backfill.selector_id().is_some());

        let mut asset_backfill = PartitionBackfill::new("b2", 0.0);
        asset_backfill.asset_selection = Some(vec![AssetKey::new(["orders"])]);
        assert_eq!(
            asset_backfill.bulk_action_type(),
            BulkActionType::MultiRunAssetAction
        );
        assert_eq!(asset_backfill.selector_id(), None);
    }
}
