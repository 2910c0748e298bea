use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    errors::StorageResult,
    models::{ObjectDescriptor, ObjectSummary},
    value_objects::{BucketName, ObjectKey, VersionId},
};

/// Fetch-and-store request for `import_from_url`
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub url: String,
    /// Also write the downloaded bytes here
    pub keep_local: Option<PathBuf>,
}

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct ImportedObject {
    pub object: ObjectDescriptor,
    pub content_type: String,
    pub url: String,
}

/// Port for everyday object operations
#[async_trait]
pub trait ObjectService: Send + Sync + 'static {
    /// List objects with a prefix
    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectSummary>>;

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectDescriptor>;

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Bytes>;

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()>;

    /// Check if object exists
    async fn object_exists(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<bool>;

    /// Download a media file and store it under `request.key`. Only images
    /// and mp4 video are accepted, detected from the content itself.
    async fn import_from_url(&self, request: ImportRequest) -> StorageResult<ImportedObject>;
}
