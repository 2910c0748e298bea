use async_trait::async_trait;

use crate::domain::{
    errors::StorageResult,
    models::BucketInfo,
    value_objects::{BucketName, ObjectKey},
};

/// Port for bucket-level administration: versioning and access
/// policies
#[async_trait]
pub trait BucketAdmin: Send + Sync + 'static {
    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>>;

    /// Create a bucket; `region` falls back to the backend's own region
    async fn create_bucket(&self, bucket: &BucketName, region: Option<&str>) -> StorageResult<()>;

    /// Delete an empty bucket. A bucket that still holds objects is a
    /// `Conflict`.
    async fn delete_bucket(&self, bucket: &BucketName) -> StorageResult<()>;

    /// Fails with `NotFound` when the bucket does not exist
    async fn head_bucket(&self, bucket: &BucketName) -> StorageResult<()>;

    async fn set_versioning(&self, bucket: &BucketName, enabled: bool) -> StorageResult<()>;

    /// Replace the bucket policy with a JSON document
    async fn put_bucket_policy(&self, bucket: &BucketName, policy: &str) -> StorageResult<()>;

    /// The bucket policy JSON; `NotFound` when none is set
    async fn get_bucket_policy(&self, bucket: &BucketName) -> StorageResult<String>;

    /// Grant anonymous read access to one object
    async fn set_object_public_read(&self, bucket: &BucketName, key: &ObjectKey)
    -> StorageResult<()>;
}
