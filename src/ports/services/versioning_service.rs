use async_trait::async_trait;
use chrono::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    errors::{StorageResult, VersionResult},
    models::{PruneReport, VersionHistory, VersionSelector},
    value_objects::{BucketName, ObjectKey, VersionId},
};

/// Service port for version pruning and rollback
#[async_trait]
pub trait VersioningService: Send + Sync + 'static {
    /// Full history of a key, oldest first
    async fn list_versions(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageResult<VersionHistory>;

    /// Delete every version last modified strictly before `now - max_age`
    async fn prune_older_than(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> VersionResult<PruneReport>;

    /// Make the selected version the latest again, returning the new
    /// latest version id
    async fn restore_version(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        selector: &VersionSelector,
    ) -> VersionResult<VersionId>;
}
