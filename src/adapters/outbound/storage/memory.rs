use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{
            BucketInfo, BulkDeleteOutcome, ObjectDescriptor, ObjectHead, ObjectIdentifier,
            ObjectSummary, ObjectVersion, PartRecord,
        },
        value_objects::{BucketName, ObjectKey, VersionId},
    },
    ports::storage::{BucketAdmin, ObjectStore, Page},
};

/// Store calls that can be made to fail with `fail_next`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    ListObjects,
    ListVersions,
    HeadObject,
    GetObject,
    PutObject,
    CopyObject,
    DeleteObject,
    DeleteObjects,
    CreateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    CreateBucket,
    DeleteBucket,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    version_id: VersionId,
    data: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
    is_delete_marker: bool,
}

#[derive(Debug)]
struct BucketState {
    created_at: DateTime<Utc>,
    versioning: bool,
    /// Versions per key, oldest first; the last one is the latest
    objects: BTreeMap<String, Vec<StoredVersion>>,
    policy: Option<String>,
    public_objects: HashSet<String>,
}

impl BucketState {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            versioning: false,
            objects: BTreeMap::new(),
            policy: None,
            public_objects: HashSet::new(),
        }
    }

    fn latest(&self, key: &str) -> Option<&StoredVersion> {
        self.objects
            .get(key)
            .and_then(|versions| versions.last())
            .filter(|version| !version.is_delete_marker)
    }

    /// Append a version, or replace the null version when versioning is off
    fn write(&mut self, key: &ObjectKey, version: StoredVersion) {
        let versions = self.objects.entry(key.to_string()).or_default();
        if version.version_id.is_null() {
            versions.retain(|existing| !existing.version_id.is_null());
        }
        versions.push(version);
    }

    /// Now, but strictly after the key's latest version so histories order
    /// the same way they were written
    fn next_timestamp(&self, key: &ObjectKey) -> DateTime<Utc> {
        let now = Utc::now();
        match self.objects.get(key.as_str()).and_then(|versions| versions.last()) {
            Some(latest) if latest.last_modified >= now => {
                latest.last_modified + chrono::Duration::microseconds(1)
            }
            _ => now,
        }
    }

    fn next_version_id(&self) -> VersionId {
        if self.versioning {
            VersionId::generate()
        } else {
            VersionId::null()
        }
    }

    fn delete(&mut self, key: &ObjectKey) {
        if self.versioning {
            let marker = StoredVersion {
                version_id: VersionId::generate(),
                data: Bytes::new(),
                content_type: None,
                etag: String::new(),
                last_modified: self.next_timestamp(key),
                is_delete_marker: true,
            };
            self.write(key, marker);
        } else {
            self.objects.remove(key.as_str());
        }
    }

    fn delete_version(&mut self, key: &ObjectKey, version_id: &VersionId) {
        if let Some(versions) = self.objects.get_mut(key.as_str()) {
            versions.retain(|version| &version.version_id != version_id);
            if versions.is_empty() {
                self.objects.remove(key.as_str());
            }
        }
    }
}

#[derive(Debug)]
struct UploadState {
    bucket: BucketName,
    key: ObjectKey,
    content_type: Option<String>,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug)]
struct Fault {
    operation: StoreOperation,
    key: Option<String>,
    /// Matching calls to let through before failing
    skip: usize,
    error: StorageError,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<BucketName, BucketState>,
    uploads: HashMap<String, UploadState>,
    faults: Vec<Fault>,
}

impl State {
    fn take_fault(&mut self, operation: StoreOperation, key: &str) -> Option<StorageError> {
        let index = self.faults.iter().position(|fault| {
            fault.operation == operation && fault.key.as_deref().map_or(true, |k| k == key)
        })?;
        if self.faults[index].skip > 0 {
            self.faults[index].skip -= 1;
            return None;
        }
        Some(self.faults.remove(index).error)
    }

    fn check(&mut self, operation: StoreOperation, key: &str) -> StorageResult<()> {
        match self.take_fault(operation, key) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn bucket(&self, bucket: &BucketName) -> StorageResult<&BucketState> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| StorageError::bucket_not_found(bucket))
    }

    fn bucket_mut(&mut self, bucket: &BucketName) -> StorageResult<&mut BucketState> {
        self.buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::bucket_not_found(bucket))
    }
}

/// Versioned object store held in memory.
///
/// Clones share the same contents. Listings do not report content types,
/// like S3's.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    state: Arc<RwLock<State>>,
    page_size: usize,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            page_size: 1000,
        }
    }

    /// Limit listing pages, to exercise pagination
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make the next matching call fail with `error`. Without a key, the
    /// next call of that operation fails whatever it touches.
    pub async fn fail_next(
        &self,
        operation: StoreOperation,
        key: Option<&str>,
        error: StorageError,
    ) {
        self.fail_after(operation, key, 0, error).await;
    }

    /// Like `fail_next`, but let `skip` matching calls succeed first
    pub async fn fail_after(
        &self,
        operation: StoreOperation,
        key: Option<&str>,
        skip: usize,
        error: StorageError,
    ) {
        self.state.write().await.faults.push(Fault {
            operation,
            key: key.map(str::to_string),
            skip,
            error,
        });
    }

    /// Write an object with an explicit modification time
    pub async fn put_object_at(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
        last_modified: DateTime<Utc>,
    ) -> StorageResult<ObjectDescriptor> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::PutObject, key.as_str())?;
        Self::write_object(&mut state, bucket, key, data, content_type, Some(last_modified))
    }

    fn write_object(
        state: &mut State,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> StorageResult<ObjectDescriptor> {
        let bucket_state = state.bucket_mut(bucket)?;
        let last_modified = last_modified.unwrap_or_else(|| bucket_state.next_timestamp(key));

        let version_id = bucket_state.next_version_id();
        let etag = format!("{:x}", md5::compute(&data));
        let size = data.len() as u64;
        bucket_state.write(
            key,
            StoredVersion {
                version_id: version_id.clone(),
                data,
                content_type: content_type.map(str::to_string),
                etag: etag.clone(),
                last_modified,
                is_delete_marker: false,
            },
        );

        Ok(ObjectDescriptor {
            bucket: bucket.clone(),
            key: key.clone(),
            size,
            etag: Some(etag),
            version_id: (!version_id.is_null()).then_some(version_id),
        })
    }

    /// Multipart uploads neither completed nor aborted
    pub async fn open_uploads(&self) -> usize {
        self.state.read().await.uploads.len()
    }

    pub async fn is_public(&self, bucket: &BucketName, key: &ObjectKey) -> bool {
        self.state
            .read()
            .await
            .buckets
            .get(bucket)
            .is_some_and(|state| state.public_objects.contains(key.as_str()))
    }
}

fn page_after<T>(items: Vec<T>, page_size: usize, offset: usize) -> Page<T> {
    let total = items.len();
    let items: Vec<T> = items.into_iter().skip(offset).take(page_size).collect();
    let end = offset + items.len();
    Page {
        items,
        next: (end < total).then(|| end.to_string()),
    }
}

fn parse_offset(continuation: Option<String>) -> StorageResult<usize> {
    continuation
        .map(|token| {
            token
                .parse()
                .map_err(|_| StorageError::invalid_input(format!("bad continuation token '{}'", token)))
        })
        .transpose()
        .map(Option::unwrap_or_default)
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects_page(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectSummary>> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::ListObjects, prefix.unwrap_or_default())?;
        let bucket_state = state.bucket(bucket)?;

        // Keys after the continuation key, in key order
        let after = continuation.unwrap_or_default();
        let mut items = Vec::new();
        let mut next = None;
        for (key, versions) in bucket_state.objects.range::<String, _>((
            std::ops::Bound::Excluded(&after),
            std::ops::Bound::Unbounded,
        )) {
            if !prefix.map_or(true, |prefix| key.starts_with(prefix)) {
                continue;
            }
            let Some(latest) = versions.last().filter(|v| !v.is_delete_marker) else {
                continue;
            };
            if items.len() == self.page_size {
                next = items
                    .last()
                    .map(|summary: &ObjectSummary| summary.key.to_string());
                break;
            }
            items.push(ObjectSummary {
                key: ObjectKey::new(key.as_str())?,
                size: latest.data.len() as u64,
                last_modified: latest.last_modified,
                etag: Some(latest.etag.clone()),
                content_type: None,
            });
        }

        Ok(Page { items, next })
    }

    async fn list_versions_page(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectVersion>> {
        let offset = parse_offset(continuation)?;
        let mut state = self.state.write().await;
        state.check(StoreOperation::ListVersions, key.as_str())?;
        let bucket_state = state.bucket(bucket)?;

        let versions = bucket_state
            .objects
            .get(key.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let latest_index = versions.len().saturating_sub(1);

        // Newest first, as S3 lists them
        let listed: Vec<ObjectVersion> = versions
            .iter()
            .enumerate()
            .rev()
            .map(|(index, version)| ObjectVersion {
                version_id: version.version_id.clone(),
                key: key.clone(),
                last_modified: version.last_modified,
                size: version.data.len() as u64,
                etag: (!version.is_delete_marker).then(|| version.etag.clone()),
                is_latest: index == latest_index,
                is_delete_marker: version.is_delete_marker,
            })
            .collect();

        Ok(page_after(listed, self.page_size, offset))
    }

    async fn head_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<ObjectHead> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::HeadObject, key.as_str())?;
        let bucket_state = state.bucket(bucket)?;
        let latest = bucket_state
            .latest(key.as_str())
            .ok_or_else(|| StorageError::object_not_found(bucket, key))?;

        Ok(ObjectHead {
            content_type: latest.content_type.clone(),
            size: latest.data.len() as u64,
            etag: Some(latest.etag.clone()),
            last_modified: latest.last_modified,
            version_id: (!latest.version_id.is_null()).then(|| latest.version_id.clone()),
        })
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Bytes> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::GetObject, key.as_str())?;
        let bucket_state = state.bucket(bucket)?;

        let version = match version_id {
            Some(version_id) => bucket_state
                .objects
                .get(key.as_str())
                .and_then(|versions| versions.iter().find(|v| &v.version_id == version_id))
                .filter(|version| !version.is_delete_marker)
                .ok_or_else(|| StorageError::version_not_found(bucket, key, version_id))?,
            None => bucket_state
                .latest(key.as_str())
                .ok_or_else(|| StorageError::object_not_found(bucket, key))?,
        };
        Ok(version.data.clone())
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectDescriptor> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::PutObject, key.as_str())?;
        Self::write_object(&mut state, bucket, key, data, content_type, None)
    }

    async fn copy_object(
        &self,
        bucket: &BucketName,
        source_key: &ObjectKey,
        source_version: Option<&VersionId>,
        destination_key: &ObjectKey,
    ) -> StorageResult<ObjectDescriptor> {
        let mut state = self.state.write().await;
        let source = {
            state.check(StoreOperation::CopyObject, source_key.as_str())?;
            let bucket_state = state.bucket(bucket)?;
            match source_version {
                Some(version_id) => bucket_state
                    .objects
                    .get(source_key.as_str())
                    .and_then(|versions| versions.iter().find(|v| &v.version_id == version_id))
                    .filter(|version| !version.is_delete_marker)
                    .cloned()
                    .ok_or_else(|| StorageError::version_not_found(bucket, source_key, version_id))?,
                None => bucket_state
                    .latest(source_key.as_str())
                    .cloned()
                    .ok_or_else(|| StorageError::object_not_found(bucket, source_key))?,
            }
        };

        Self::write_object(
            &mut state,
            bucket,
            destination_key,
            source.data,
            source.content_type.as_deref(),
            None,
        )
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::DeleteObject, key.as_str())?;
        state.bucket_mut(bucket)?.delete(key);
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &BucketName,
        identifiers: &[ObjectIdentifier],
    ) -> StorageResult<BulkDeleteOutcome> {
        let mut state = self.state.write().await;
        state.bucket(bucket)?;

        let mut outcome = BulkDeleteOutcome::default();
        for identifier in identifiers {
            if let Some(error) = state.take_fault(StoreOperation::DeleteObjects, identifier.key.as_str())
            {
                outcome.errors.push((identifier.clone(), error));
                continue;
            }

            let bucket_state = state.bucket_mut(bucket)?;
            match &identifier.version_id {
                Some(version_id) => bucket_state.delete_version(&identifier.key, version_id),
                None => bucket_state.delete(&identifier.key),
            }
            outcome.deleted.push(identifier.clone());
        }
        Ok(outcome)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::CreateMultipartUpload, key.as_str())?;
        state.bucket(bucket)?;

        let upload_id = Uuid::new_v4().simple().to_string();
        state.uploads.insert(
            upload_id.clone(),
            UploadState {
                bucket: bucket.clone(),
                key: key.clone(),
                content_type: content_type.map(str::to_string),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::UploadPart, key.as_str())?;

        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|upload| &upload.bucket == bucket && &upload.key == key)
            .ok_or_else(|| StorageError::upload_not_found(upload_id))?;
        if part_number == 0 {
            return Err(StorageError::invalid_input("part numbers start at 1"));
        }

        let tag = format!("{:x}", md5::compute(&data));
        upload.parts.insert(part_number, (tag.clone(), data));
        Ok(tag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<ObjectDescriptor> {
        let mut state = self.state.write().await;
        let (content_type, data) = {
            state.check(StoreOperation::CompleteMultipartUpload, key.as_str())?;

            let upload = state
                .uploads
                .get(upload_id)
                .filter(|upload| &upload.bucket == bucket && &upload.key == key)
                .ok_or_else(|| StorageError::upload_not_found(upload_id))?;

            if parts.is_empty() || parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
                return Err(StorageError::invalid_input(
                    "parts must be listed in ascending order",
                ));
            }

            let mut data = BytesMut::new();
            for part in parts {
                match upload.parts.get(&part.part_number) {
                    Some((tag, bytes)) if *tag == part.checksum_tag => data.extend_from_slice(bytes),
                    _ => {
                        return Err(StorageError::invalid_input(format!(
                            "part {} does not match an uploaded part",
                            part.part_number
                        )))
                    }
                }
            }

            let content_type = upload.content_type.clone();
            state.uploads.remove(upload_id);
            (content_type, data.freeze())
        };

        Self::write_object(&mut state, bucket, key, data, content_type.as_deref(), None)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::AbortMultipartUpload, key.as_str())?;

        match state.uploads.get(upload_id) {
            Some(upload) if &upload.bucket == bucket && &upload.key == key => {
                state.uploads.remove(upload_id);
                Ok(())
            }
            _ => Err(StorageError::upload_not_found(upload_id)),
        }
    }

    fn object_url(&self, bucket: &BucketName, key: &ObjectKey) -> String {
        format!("memory://{}/{}", bucket, key)
    }
}

#[async_trait]
impl BucketAdmin for InMemoryObjectStore {
    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let state = self.state.read().await;
        Ok(state
            .buckets
            .iter()
            .map(|(name, bucket)| BucketInfo {
                name: name.clone(),
                created_at: Some(bucket.created_at),
            })
            .collect())
    }

    async fn create_bucket(&self, bucket: &BucketName, _region: Option<&str>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::CreateBucket, bucket.as_str())?;
        if state.buckets.contains_key(bucket) {
            return Err(StorageError::Conflict {
                message: format!("bucket '{}' already exists", bucket),
            });
        }
        state.buckets.insert(bucket.clone(), BucketState::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.check(StoreOperation::DeleteBucket, bucket.as_str())?;
        if !state.bucket(bucket)?.objects.is_empty() {
            return Err(StorageError::Conflict {
                message: format!("bucket '{}' is not empty", bucket),
            });
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn head_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        self.state.read().await.bucket(bucket).map(|_| ())
    }

    async fn set_versioning(&self, bucket: &BucketName, enabled: bool) -> StorageResult<()> {
        self.state.write().await.bucket_mut(bucket)?.versioning = enabled;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &BucketName, policy: &str) -> StorageResult<()> {
        serde_json::from_str::<serde_json::Value>(policy)
            .map_err(|err| StorageError::invalid_input(format!("policy is not JSON: {}", err)))?;
        self.state.write().await.bucket_mut(bucket)?.policy = Some(policy.to_string());
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &BucketName) -> StorageResult<String> {
        self.state
            .read()
            .await
            .bucket(bucket)?
            .policy
            .clone()
            .ok_or_else(|| StorageError::NotFound {
                resource: format!("policy of bucket '{}'", bucket),
            })
    }

    async fn set_object_public_read(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let bucket_state = state.bucket_mut(bucket)?;
        if bucket_state.latest(key.as_str()).is_none() {
            return Err(StorageError::object_not_found(bucket, key));
        }
        bucket_state.public_objects.insert(key.to_string());
        Ok(())
    }
}
