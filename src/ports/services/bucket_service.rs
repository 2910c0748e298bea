use async_trait::async_trait;

use crate::domain::{
    errors::StorageResult,
    models::{BucketBatchResult, BucketInfo, PolicyDocument},
    value_objects::{BucketName, ObjectKey},
};

/// Service port for bucket administration and access policies
#[async_trait]
pub trait BucketService: Send + Sync + 'static {
    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>>;

    async fn create_bucket(&self, bucket: &BucketName, region: Option<&str>) -> StorageResult<()>;

    /// Create `<base>-<first>` through `<base>-<last>`, stopping at the
    /// first failure
    async fn create_bucket_range(
        &self,
        base: &str,
        first: u32,
        last: u32,
        region: Option<&str>,
    ) -> StorageResult<BucketBatchResult>;

    async fn delete_bucket(&self, bucket: &BucketName) -> StorageResult<()>;

    /// Attempt to delete every bucket, collecting failures per bucket
    async fn delete_all_buckets(&self) -> StorageResult<BucketBatchResult>;

    async fn bucket_exists(&self, bucket: &BucketName) -> StorageResult<bool>;

    async fn set_versioning(&self, bucket: &BucketName, enabled: bool) -> StorageResult<()>;

    fn public_read_policy(&self, bucket: &BucketName) -> PolicyDocument {
        PolicyDocument::public_read(bucket)
    }

    async fn apply_public_read_policy(&self, bucket: &BucketName) -> StorageResult<PolicyDocument>;

    async fn get_bucket_policy(&self, bucket: &BucketName) -> StorageResult<String>;

    async fn make_object_public(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()>;
}
