use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{BucketBatchResult, BucketInfo, PolicyDocument},
        value_objects::{BucketName, ObjectKey},
    },
    ports::{services::BucketService, storage::BucketAdmin},
};

/// Implementation of BucketService over a bucket administration port
#[derive(Clone)]
pub struct BucketServiceImpl {
    admin: Arc<dyn BucketAdmin>,
}

impl BucketServiceImpl {
    pub fn new(admin: Arc<dyn BucketAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl BucketService for BucketServiceImpl {
    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        self.admin.list_buckets().await
    }

    #[instrument(skip_all, fields(bucket = %bucket))]
    async fn create_bucket(&self, bucket: &BucketName, region: Option<&str>) -> StorageResult<()> {
        self.admin.create_bucket(bucket, region).await?;
        info!("bucket created");
        Ok(())
    }

    #[instrument(skip_all, fields(base = %base, first = first, last = last))]
    async fn create_bucket_range(
        &self,
        base: &str,
        first: u32,
        last: u32,
        region: Option<&str>,
    ) -> StorageResult<BucketBatchResult> {
        if first > last {
            return Err(StorageError::invalid_input(format!(
                "empty bucket range {}..={}",
                first, last
            )));
        }

        // Reject a bad base name before anything is created
        let names = (first..=last)
            .map(|index| BucketName::new(format!("{}-{}", base, index)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = BucketBatchResult::default();
        for name in names {
            match self.admin.create_bucket(&name, region).await {
                Ok(()) => {
                    info!(bucket = %name, "bucket created");
                    result.succeeded.push(name);
                }
                Err(err) => {
                    warn!(bucket = %name, error = %err, "bucket creation failed, stopping");
                    result.failed.push((name, err));
                    break;
                }
            }
        }
        Ok(result)
    }

    #[instrument(skip_all, fields(bucket = %bucket))]
    async fn delete_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        self.admin.delete_bucket(bucket).await?;
        info!("bucket deleted");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn delete_all_buckets(&self) -> StorageResult<BucketBatchResult> {
        let buckets = self.admin.list_buckets().await?;

        let mut result = BucketBatchResult::default();
        for bucket in buckets {
            match self.admin.delete_bucket(&bucket.name).await {
                Ok(()) => result.succeeded.push(bucket.name),
                Err(err) => {
                    warn!(bucket = %bucket.name, error = %err, "bucket not deleted");
                    result.failed.push((bucket.name, err));
                }
            }
        }

        info!(
            deleted = result.succeeded.len(),
            failed = result.failed.len(),
            "delete-all finished"
        );
        Ok(result)
    }

    async fn bucket_exists(&self, bucket: &BucketName) -> StorageResult<bool> {
        match self.admin.head_bucket(bucket).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn set_versioning(&self, bucket: &BucketName, enabled: bool) -> StorageResult<()> {
        self.admin.set_versioning(bucket, enabled).await
    }

    #[instrument(skip_all, fields(bucket = %bucket))]
    async fn apply_public_read_policy(&self, bucket: &BucketName) -> StorageResult<PolicyDocument> {
        let policy = self.public_read_policy(bucket);
        let document = policy
            .to_json()
            .map_err(|err| StorageError::invalid_input(format!("unserializable policy: {}", err)))?;

        self.admin.put_bucket_policy(bucket, &document).await?;
        info!("public-read policy applied");
        Ok(policy)
    }

    async fn get_bucket_policy(&self, bucket: &BucketName) -> StorageResult<String> {
        self.admin.get_bucket_policy(bucket).await
    }

    #[instrument(skip_all, fields(bucket = %bucket, key = %key))]
    async fn make_object_public(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()> {
        self.admin.set_object_public_read(bucket, key).await?;
        info!("object is publicly readable");
        Ok(())
    }
}
