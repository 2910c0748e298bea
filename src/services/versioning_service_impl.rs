use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    app::BatchConfig,
    domain::{
        errors::{StorageError, StorageResult, VersionError, VersionResult},
        models::{ObjectIdentifier, PruneReport, VersionHistory, VersionSelector},
        value_objects::{BucketName, ObjectKey, VersionId},
    },
    ports::{
        services::VersioningService,
        storage::{version_listing, ObjectStore},
    },
};

/// Implementation of versioning service
#[derive(Clone)]
pub struct VersioningServiceImpl {
    store: Arc<dyn ObjectStore>,
    config: BatchConfig,
}

impl VersioningServiceImpl {
    pub fn new(store: Arc<dyn ObjectStore>, config: BatchConfig) -> Self {
        Self { store, config }
    }

    fn delete_batch_size(&self) -> usize {
        self.config
            .delete_batch_size
            .min(self.store.max_delete_batch())
            .max(1)
    }
}

#[async_trait]
impl VersioningService for VersioningServiceImpl {
    async fn list_versions(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageResult<VersionHistory> {
        let versions: Vec<_> = version_listing(self.store.clone(), bucket.clone(), key.clone())
            .try_collect()
            .await?;
        Ok(VersionHistory::new(versions))
    }

    #[instrument(skip_all, fields(bucket = %bucket, key = %key))]
    async fn prune_older_than(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> VersionResult<PruneReport> {
        if max_age <= Duration::zero() {
            return Err(VersionError::InvalidInput {
                message: format!("maximum age must be positive, got {}", max_age),
            });
        }

        let cutoff = Utc::now() - max_age;
        let history = self.list_versions(bucket, key).await?;
        let doomed: Vec<ObjectIdentifier> = history
            .older_than(cutoff)
            .map(|version| ObjectIdentifier::version(version.key.clone(), version.version_id.clone()))
            .collect();

        let mut report = PruneReport {
            key: key.clone(),
            cutoff,
            deleted: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        };

        if doomed.is_empty() {
            info!(versions = history.len(), "nothing older than cutoff");
            return Ok(report);
        }

        for batch in doomed.chunks(self.delete_batch_size()) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.store.delete_objects(bucket, batch).await {
                Ok(outcome) => {
                    report
                        .deleted
                        .extend(outcome.deleted.into_iter().filter_map(|id| id.version_id));
                    for (identifier, error) in outcome.errors {
                        warn!(version = %identifier, error = %error, "version not deleted");
                        if let Some(version_id) = identifier.version_id {
                            report.failed.push((version_id, error));
                        }
                    }
                }
                // Nothing has changed yet, so the whole prune failed
                Err(err) if report.deleted.is_empty() && report.failed.is_empty() => {
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(error = %err, versions = batch.len(), "bulk delete rejected");
                    report.failed.extend(batch.iter().filter_map(|identifier| {
                        identifier
                            .version_id
                            .clone()
                            .map(|version_id| (version_id, err.clone()))
                    }));
                }
            }
        }

        info!(
            deleted = report.count(),
            failed = report.failed.len(),
            cutoff = %cutoff,
            "prune finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(bucket = %bucket, key = %key, selector = %selector))]
    async fn restore_version(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        selector: &VersionSelector,
    ) -> VersionResult<VersionId> {
        let history = self.list_versions(bucket, key).await?;
        let target = history
            .resolve(selector)
            .ok_or_else(|| VersionError::NoSuchVersion {
                bucket: bucket.clone(),
                key: key.clone(),
                selector: selector.to_string(),
            })?;

        let restored = self
            .store
            .copy_object(bucket, key, Some(&target.version_id), key)
            .await?;

        let new_latest = restored.version_id.ok_or_else(|| {
            StorageError::unsupported(
                "restore_version",
                format!("bucket '{}' does not keep versions", bucket),
            )
        })?;

        info!(from = %target.version_id, to = %new_latest, "version restored");
        Ok(new_latest)
    }
}
