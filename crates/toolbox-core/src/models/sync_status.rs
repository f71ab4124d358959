//! Sync status model

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::DataType;

/// Outcome of the most recent sync attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether remote sync is turned on
    pub enabled: bool,
    /// Timestamp (unix ms) of the most recent successful push or pull
    #[serde(default)]
    pub last_synced_at: Option<i64>,
    /// True while at least one data type failed its last sync attempt
    #[serde(default)]
    pub has_pending_changes: bool,
    /// Data types whose last sync attempt failed
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending: BTreeSet<DataType>,
}

impl SyncStatus {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Record a successful sync of `data_type` at `at` (unix ms).
    pub fn mark_synced(&mut self, data_type: &DataType, at: i64) {
        self.pending.remove(data_type);
        self.last_synced_at = Some(at);
        self.has_pending_changes = !self.pending.is_empty();
    }

    /// Record a failed sync of `data_type`.
    pub fn mark_pending(&mut self, data_type: DataType) {
        self.pending.insert(data_type);
        self.has_pending_changes = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_of_one_type_keeps_other_pending() {
        let mut status = SyncStatus::new(true);
        status.mark_pending(DataType::Links);
        status.mark_pending(DataType::Preferences);
        status.mark_synced(&DataType::Preferences, 10);
        assert!(status.has_pending_changes);
        assert_eq!(status.last_synced_at, Some(10));
        status.mark_synced(&DataType::Links, 20);
        assert!(!status.has_pending_changes);
    }
}
