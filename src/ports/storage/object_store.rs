use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    errors::StorageResult,
    models::{
        BulkDeleteOutcome, ObjectDescriptor, ObjectHead, ObjectIdentifier, ObjectSummary,
        ObjectVersion, PartRecord,
    },
    value_objects::{BucketName, ObjectKey, VersionId},
};

/// One page of a listing. `next` is an opaque continuation token; `None`
/// means the listing is exhausted.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Port for object storage operations.
///
/// This abstracts the storage backend (S3, a local directory, memory). Every
/// call names its bucket; a missing bucket surfaces as `NotFound` from the
/// first call that touches it.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List one page of objects, optionally under a prefix
    async fn list_objects_page(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectSummary>>;

    /// List one page of the versions of exactly `key`
    async fn list_versions_page(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectVersion>>;

    /// Get object metadata without retrieving data
    async fn head_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<ObjectHead>;

    /// Retrieve object data, optionally of a specific version
    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Bytes>;

    /// Store object data in a single request
    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectDescriptor>;

    /// Copy an object, or one of its versions, to a key in the same bucket
    async fn copy_object(
        &self,
        bucket: &BucketName,
        source_key: &ObjectKey,
        source_version: Option<&VersionId>,
        destination_key: &ObjectKey,
    ) -> StorageResult<ObjectDescriptor>;

    /// Delete an object (adds a delete marker on versioned buckets)
    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()>;

    /// Delete many objects or versions in one request.
    ///
    /// Per-identifier failures are reported in the outcome; the call itself
    /// only fails when the request as a whole was rejected.
    async fn delete_objects(
        &self,
        bucket: &BucketName,
        identifiers: &[ObjectIdentifier],
    ) -> StorageResult<BulkDeleteOutcome>;

    /// Initiate a multipart upload, returning the upload id
    async fn create_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    /// Upload a part in a multipart upload, returning its checksum tag (ETag)
    async fn upload_part(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Complete a multipart upload; parts are listed in ascending order
    async fn complete_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<ObjectDescriptor>;

    /// Abort a multipart upload, releasing any uploaded parts
    async fn abort_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> StorageResult<()>;

    /// Largest number of identifiers a single bulk delete may carry
    fn max_delete_batch(&self) -> usize {
        1000
    }

    /// Public URL of an object, when the backend has one
    fn object_url(&self, bucket: &BucketName, key: &ObjectKey) -> String;
}
