use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    errors::StorageResult,
    models::{BatchResult, ClassificationRule, ReorganizePlan},
    value_objects::BucketName,
};

/// Service port for moving a bucket's objects into classification folders
#[async_trait]
pub trait ReorganizeService: Send + Sync + 'static {
    /// Compute where every object of the bucket belongs. Objects already in
    /// their folder are left out of the plan.
    async fn plan(
        &self,
        bucket: &BucketName,
        rule: ClassificationRule,
    ) -> StorageResult<ReorganizePlan>;

    /// Copy each entry to its destination and delete the source. Failures
    /// are collected per entry; once `cancel` fires, unstarted entries are
    /// reported as skipped.
    async fn execute(&self, plan: &ReorganizePlan, cancel: CancellationToken) -> BatchResult;
}
