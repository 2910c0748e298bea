use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    errors::{StorageError, ValidationError},
    value_objects::{ObjectKey, VersionId},
};

/// One entry of an object's version history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectVersion {
    pub version_id: VersionId,
    pub key: ObjectKey,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub etag: Option<String>,
    pub is_latest: bool,
    pub is_delete_marker: bool,
}

/// Which version a rollback should restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// A specific version id
    Id(VersionId),
    /// The oldest version
    Earliest,
    /// The second most recent version
    Previous,
}

impl std::str::FromStr for VersionSelector {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches(':') {
            "earliest" | "first" => Ok(VersionSelector::Earliest),
            "previous" | "lastversion" => Ok(VersionSelector::Previous),
            _ => VersionId::new(s).map(VersionSelector::Id),
        }
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSelector::Id(id) => write!(f, "{}", id),
            VersionSelector::Earliest => write!(f, "earliest"),
            VersionSelector::Previous => write!(f, "previous"),
        }
    }
}

/// Versions of a single key ordered oldest first
#[derive(Debug, Clone, Default)]
pub struct VersionHistory {
    versions: Vec<ObjectVersion>,
}

impl VersionHistory {
    /// Orders versions by `last_modified` ascending. Equal timestamps keep the
    /// store's order, except that the store-reported latest sorts last.
    pub fn new(mut versions: Vec<ObjectVersion>) -> Self {
        versions.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then(a.is_latest.cmp(&b.is_latest))
        });
        Self { versions }
    }

    pub fn versions(&self) -> &[ObjectVersion] {
        &self.versions
    }

    pub fn into_versions(self) -> Vec<ObjectVersion> {
        self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Versions strictly older than `cutoff`, delete markers included
    pub fn older_than(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &ObjectVersion> {
        self.versions
            .iter()
            .filter(move |version| version.last_modified < cutoff)
    }

    /// Resolve a selector against the versions that carry content
    pub fn resolve(&self, selector: &VersionSelector) -> Option<&ObjectVersion> {
        let restorable: Vec<&ObjectVersion> = self
            .versions
            .iter()
            .filter(|version| !version.is_delete_marker)
            .collect();

        match selector {
            VersionSelector::Id(id) => restorable.into_iter().find(|v| &v.version_id == id),
            VersionSelector::Earliest => restorable.first().copied(),
            VersionSelector::Previous => restorable
                .len()
                .checked_sub(2)
                .map(|index| restorable[index]),
        }
    }
}

/// Outcome of pruning one key's history
#[derive(Debug, Clone, PartialEq)]
pub struct PruneReport {
    pub key: ObjectKey,
    pub cutoff: DateTime<Utc>,
    pub deleted: Vec<VersionId>,
    pub failed: Vec<(VersionId, StorageError)>,
    /// Set when cancellation stopped the prune before every batch was sent
    pub cancelled: bool,
}

impl PruneReport {
    pub fn count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn version(id: &str, age_days: i64, is_latest: bool) -> ObjectVersion {
        ObjectVersion {
            version_id: VersionId::new(id).unwrap(),
            key: ObjectKey::new("report.pdf").unwrap(),
            last_modified: Utc::now() - Duration::days(age_days),
            size: 10,
            etag: None,
            is_latest,
            is_delete_marker: false,
        }
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("earliest".parse(), Ok(VersionSelector::Earliest));
        assert_eq!(":lastversion".parse(), Ok(VersionSelector::Previous));
        assert_eq!("previous".parse(), Ok(VersionSelector::Previous));
        assert_eq!(
            "abc123".parse(),
            Ok(VersionSelector::Id(VersionId::new("abc123").unwrap()))
        );
        assert!("".parse::<VersionSelector>().is_err());
    }

    #[test]
    fn test_history_is_chronological_regardless_of_store_order() {
        // Stores commonly list newest first
        let history = VersionHistory::new(vec![
            version("v3", 0, true),
            version("v1", 10, false),
            version("v2", 5, false),
        ]);

        let ids: Vec<&str> = history
            .versions()
            .iter()
            .map(|v| v.version_id.as_str())
            .collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);

        assert_eq!(
            history.resolve(&VersionSelector::Earliest).unwrap().version_id.as_str(),
            "v1"
        );
        assert_eq!(
            history.resolve(&VersionSelector::Previous).unwrap().version_id.as_str(),
            "v2"
        );
    }

    #[test]
    fn test_previous_needs_two_versions() {
        let history = VersionHistory::new(vec![version("only", 1, true)]);
        assert!(history.resolve(&VersionSelector::Previous).is_none());
        assert!(history.resolve(&VersionSelector::Earliest).is_some());
    }

    #[test]
    fn test_delete_markers_are_not_restorable() {
        let mut marker = version("marker", 0, true);
        marker.is_delete_marker = true;
        let history = VersionHistory::new(vec![marker, version("v1", 3, false)]);

        assert!(history.resolve(&VersionSelector::Previous).is_none());
        assert!(history
            .resolve(&VersionSelector::Id(VersionId::new("marker").unwrap()))
            .is_none());
        assert_eq!(history.older_than(Utc::now() - Duration::days(1)).count(), 1);
    }
}
