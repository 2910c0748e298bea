use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::{
    local::LocalFileSystem, memory::InMemory, path::Path as ObjectPath, Attribute,
    AttributeValue, Attributes, GetOptions, MultipartUpload, ObjectStore as ApacheObjectStore,
    PutMultipartOptions, PutOptions, PutPayload,
};
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

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

const PAGE_SIZE: usize = 1000;

/// Where buckets live
#[derive(Debug)]
enum Layout {
    /// One directory per bucket under a root
    Directory(PathBuf),
    /// Buckets tracked in memory, objects in an `InMemory` store
    Memory(RwLock<BTreeMap<BucketName, DateTime<Utc>>>),
}

/// A multipart upload in progress. Parts may arrive out of order but are
/// handed to object_store in part-number order.
#[derive(Debug)]
struct PendingUpload {
    bucket: BucketName,
    key: ObjectKey,
    upload: Box<dyn MultipartUpload>,
    next_part: u32,
    buffered: BTreeMap<u32, Bytes>,
    tags: HashMap<u32, String>,
}

/// Unversioned object store over Apache `object_store`, with buckets as the
/// first path segment
#[derive(Debug)]
pub struct ApacheObjectStoreAdapter {
    inner: Arc<dyn ApacheObjectStore>,
    layout: Layout,
    uploads: Mutex<HashMap<String, PendingUpload>>,
}

impl ApacheObjectStoreAdapter {
    /// Buckets are directories under `root`, which is created if missing
    pub fn local(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|err| io_error(err, &root.display().to_string()))?;
        let inner = LocalFileSystem::new_with_prefix(&root)?;
        Ok(Self {
            inner: Arc::new(inner),
            layout: Layout::Directory(root),
            uploads: Mutex::new(HashMap::new()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            layout: Layout::Memory(RwLock::new(BTreeMap::new())),
            uploads: Mutex::new(HashMap::new()),
        }
    }

    /// LocalFileSystem rejects attributes, so content types are only kept in memory
    fn stores_content_type(&self) -> bool {
        matches!(self.layout, Layout::Memory(_))
    }

    fn attributes(&self, content_type: Option<&str>) -> Attributes {
        let mut attributes = Attributes::new();
        if let (true, Some(content_type)) = (self.stores_content_type(), content_type) {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }
        attributes
    }

    fn path(bucket: &BucketName, key: &ObjectKey) -> StorageResult<ObjectPath> {
        ObjectPath::parse(format!("{}/{}", bucket, key))
            .map_err(|err| StorageError::invalid_input(err.to_string()))
    }

    async fn bucket_exists(&self, bucket: &BucketName) -> StorageResult<bool> {
        match &self.layout {
            Layout::Directory(root) => match tokio::fs::metadata(root.join(bucket.as_str())).await {
                Ok(meta) => Ok(meta.is_dir()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(io_error(err, bucket.as_str())),
            },
            Layout::Memory(buckets) => Ok(buckets.read().await.contains_key(bucket)),
        }
    }

    async fn ensure_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(StorageError::bucket_not_found(bucket))
        }
    }

    /// Every key of a bucket, sorted
    async fn all_objects(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectSummary>> {
        let bucket_path = ObjectPath::from(bucket.as_str());
        let metas: Vec<_> = self.inner.list(Some(&bucket_path)).try_collect().await?;

        let mut objects = Vec::with_capacity(metas.len());
        for meta in metas {
            let location = meta.location.to_string();
            let Some(key) = location.strip_prefix(&format!("{}/", bucket)) else {
                continue;
            };
            // S3 prefixes are plain string prefixes, not path segments
            if !prefix.map_or(true, |prefix| key.starts_with(prefix)) {
                continue;
            }
            objects.push(ObjectSummary {
                key: ObjectKey::new(key)?,
                size: meta.size as u64,
                last_modified: meta.last_modified,
                etag: meta.e_tag,
                content_type: None,
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn descriptor(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageResult<ObjectDescriptor> {
        let head = self.head_object(bucket, key).await?;
        Ok(ObjectDescriptor {
            bucket: bucket.clone(),
            key: key.clone(),
            size: head.size,
            etag: head.etag,
            version_id: None,
        })
    }

    async fn take_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> StorageResult<PendingUpload> {
        let mut uploads = self.uploads.lock().await;
        match uploads.remove(upload_id) {
            Some(pending) if &pending.bucket == bucket && &pending.key == key => Ok(pending),
            Some(pending) => {
                uploads.insert(upload_id.to_string(), pending);
                Err(StorageError::upload_not_found(upload_id))
            }
            None => Err(StorageError::upload_not_found(upload_id)),
        }
    }

    fn reject_version(
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<()> {
        match version_id {
            Some(version_id) if !version_id.is_null() => {
                Err(StorageError::version_not_found(bucket, key, version_id))
            }
            _ => Ok(()),
        }
    }
}

fn io_error(err: std::io::Error, resource: &str) -> StorageError {
    match err.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound {
            resource: resource.to_string(),
        },
        std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
            operation: "filesystem".to_string(),
            resource: resource.to_string(),
        },
        std::io::ErrorKind::AlreadyExists => StorageError::Conflict {
            message: format!("'{}' already exists", resource),
        },
        _ => StorageError::Backend {
            code: "IoError".to_string(),
            message: format!("{}: {}", resource, err),
        },
    }
}

#[async_trait]
impl ObjectStore for ApacheObjectStoreAdapter {
    async fn list_objects_page(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectSummary>> {
        self.ensure_bucket(bucket).await?;
        let objects = self.all_objects(bucket, prefix).await?;

        let after = continuation.unwrap_or_default();
        let mut remaining = objects
            .into_iter()
            .filter(|object| object.key.as_str() > after.as_str());
        let items: Vec<ObjectSummary> = remaining.by_ref().take(PAGE_SIZE).collect();
        let next = match remaining.next() {
            Some(_) => items.last().map(|object| object.key.to_string()),
            None => None,
        };
        Ok(Page { items, next })
    }

    /// The current object is the only version
    async fn list_versions_page(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        _continuation: Option<String>,
    ) -> StorageResult<Page<ObjectVersion>> {
        self.ensure_bucket(bucket).await?;
        match self.head_object(bucket, key).await {
            Ok(head) => Ok(Page::last(vec![ObjectVersion {
                version_id: VersionId::null(),
                key: key.clone(),
                last_modified: head.last_modified,
                size: head.size,
                etag: head.etag,
                is_latest: true,
                is_delete_marker: false,
            }])),
            Err(err) if err.is_not_found() => Ok(Page::last(Vec::new())),
            Err(err) => Err(err),
        }
    }

    async fn head_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<ObjectHead> {
        let path = Self::path(bucket, key)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self.inner.get_opts(&path, options).await?;
        let content_type = result.attributes.get(&Attribute::ContentType).map(|value| {
            let value: &str = value.as_ref();
            value.to_string()
        });

        Ok(ObjectHead {
            content_type,
            size: result.meta.size as u64,
            etag: result.meta.e_tag,
            last_modified: result.meta.last_modified,
            version_id: None,
        })
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Bytes> {
        Self::reject_version(bucket, key, version_id)?;
        let path = Self::path(bucket, key)?;
        Ok(self.inner.get(&path).await?.bytes().await?)
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectDescriptor> {
        self.ensure_bucket(bucket).await?;
        let path = Self::path(bucket, key)?;
        let size = data.len() as u64;
        let options = PutOptions {
            attributes: self.attributes(content_type),
            ..Default::default()
        };

        let result = self
            .inner
            .put_opts(&path, PutPayload::from(data), options)
            .await?;

        Ok(ObjectDescriptor {
            bucket: bucket.clone(),
            key: key.clone(),
            size,
            etag: result.e_tag,
            version_id: None,
        })
    }

    async fn copy_object(
        &self,
        bucket: &BucketName,
        source_key: &ObjectKey,
        source_version: Option<&VersionId>,
        destination_key: &ObjectKey,
    ) -> StorageResult<ObjectDescriptor> {
        Self::reject_version(bucket, source_key, source_version)?;
        let from = Self::path(bucket, source_key)?;
        let to = Self::path(bucket, destination_key)?;

        self.inner.copy(&from, &to).await?;
        self.descriptor(bucket, destination_key).await
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()> {
        self.ensure_bucket(bucket).await?;
        let path = Self::path(bucket, key)?;
        match self.inner.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_objects(
        &self,
        bucket: &BucketName,
        identifiers: &[ObjectIdentifier],
    ) -> StorageResult<BulkDeleteOutcome> {
        self.ensure_bucket(bucket).await?;

        let mut outcome = BulkDeleteOutcome::default();
        for identifier in identifiers {
            // Only the null version exists here; other ids have nothing to delete
            let result = match &identifier.version_id {
                Some(version_id) if !version_id.is_null() => Ok(()),
                _ => self.delete_object(bucket, &identifier.key).await,
            };
            match result {
                Ok(()) => outcome.deleted.push(identifier.clone()),
                Err(err) => outcome.errors.push((identifier.clone(), err)),
            }
        }
        Ok(outcome)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        self.ensure_bucket(bucket).await?;
        let path = Self::path(bucket, key)?;
        let options = PutMultipartOptions {
            attributes: self.attributes(content_type),
            ..Default::default()
        };
        let upload = self.inner.put_multipart_opts(&path, options).await?;

        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        debug!(%bucket, %key, %upload_id, "opened object_store multipart upload");
        self.uploads.lock().await.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.clone(),
                key: key.clone(),
                upload,
                next_part: 1,
                buffered: BTreeMap::new(),
                tags: HashMap::new(),
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
        let tag = format!("{:x}", md5::compute(&data));

        let writes = {
            let mut uploads = self.uploads.lock().await;
            let pending = uploads
                .get_mut(upload_id)
                .filter(|pending| &pending.bucket == bucket && &pending.key == key)
                .ok_or_else(|| StorageError::upload_not_found(upload_id))?;
            if part_number < pending.next_part || pending.buffered.contains_key(&part_number) {
                return Err(StorageError::invalid_input(format!(
                    "part {} was already uploaded",
                    part_number
                )));
            }

            pending.tags.insert(part_number, tag.clone());
            pending.buffered.insert(part_number, data);

            let mut writes = Vec::new();
            while let Some(data) = pending.buffered.remove(&pending.next_part) {
                writes.push(pending.upload.put_part(PutPayload::from(data)));
                pending.next_part += 1;
            }
            writes
        };

        futures::future::try_join_all(writes).await?;
        Ok(tag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<ObjectDescriptor> {
        let mut pending = self.take_upload(bucket, key, upload_id).await?;

        let expected: Vec<u32> = (1..pending.next_part).collect();
        let listed: Vec<u32> = parts.iter().map(|part| part.part_number).collect();
        let tags_match = parts
            .iter()
            .all(|part| pending.tags.get(&part.part_number) == Some(&part.checksum_tag));
        if !pending.buffered.is_empty() || listed != expected || !tags_match {
            pending.upload.abort().await?;
            return Err(StorageError::invalid_input(
                "completion list does not match the uploaded parts",
            ));
        }

        pending.upload.complete().await?;
        self.descriptor(bucket, key).await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> StorageResult<()> {
        let mut pending = self.take_upload(bucket, key, upload_id).await?;
        pending.upload.abort().await?;
        Ok(())
    }

    fn object_url(&self, bucket: &BucketName, key: &ObjectKey) -> String {
        match &self.layout {
            Layout::Directory(root) => format!(
                "file://{}",
                root.join(bucket.as_str()).join(key.as_str()).display()
            ),
            Layout::Memory(_) => format!("memory://{}/{}", bucket, key),
        }
    }
}

#[async_trait]
impl BucketAdmin for ApacheObjectStoreAdapter {
    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        match &self.layout {
            Layout::Directory(root) => {
                let mut entries = tokio::fs::read_dir(root)
                    .await
                    .map_err(|err| io_error(err, &root.display().to_string()))?;
                let mut buckets = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|err| io_error(err, &root.display().to_string()))?
                {
                    let Ok(meta) = entry.metadata().await else {
                        continue;
                    };
                    let Ok(name) = BucketName::new(entry.file_name().to_string_lossy()) else {
                        continue;
                    };
                    if meta.is_dir() {
                        buckets.push(BucketInfo {
                            name,
                            created_at: meta
                                .created()
                                .or_else(|_| meta.modified())
                                .ok()
                                .map(DateTime::<Utc>::from),
                        });
                    }
                }
                buckets.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(buckets)
            }
            Layout::Memory(buckets) => Ok(buckets
                .read()
                .await
                .iter()
                .map(|(name, created_at)| BucketInfo {
                    name: name.clone(),
                    created_at: Some(*created_at),
                })
                .collect()),
        }
    }

    async fn create_bucket(&self, bucket: &BucketName, _region: Option<&str>) -> StorageResult<()> {
        match &self.layout {
            Layout::Directory(root) => tokio::fs::create_dir(root.join(bucket.as_str()))
                .await
                .map_err(|err| io_error(err, &format!("bucket '{}'", bucket))),
            Layout::Memory(buckets) => {
                let mut buckets = buckets.write().await;
                if buckets.contains_key(bucket) {
                    return Err(StorageError::Conflict {
                        message: format!("bucket '{}' already exists", bucket),
                    });
                }
                buckets.insert(bucket.clone(), Utc::now());
                Ok(())
            }
        }
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        self.ensure_bucket(bucket).await?;
        if !self.all_objects(bucket, None).await?.is_empty() {
            return Err(StorageError::Conflict {
                message: format!("bucket '{}' is not empty", bucket),
            });
        }

        match &self.layout {
            // Empty subdirectories may remain after deletes
            Layout::Directory(root) => tokio::fs::remove_dir_all(root.join(bucket.as_str()))
                .await
                .map_err(|err| io_error(err, &format!("bucket '{}'", bucket))),
            Layout::Memory(buckets) => {
                buckets.write().await.remove(bucket);
                Ok(())
            }
        }
    }

    async fn head_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        self.ensure_bucket(bucket).await
    }

    async fn set_versioning(&self, bucket: &BucketName, enabled: bool) -> StorageResult<()> {
        self.ensure_bucket(bucket).await?;
        if enabled {
            return Err(StorageError::unsupported(
                "set_versioning",
                "object_store backends keep a single version per key",
            ));
        }
        Ok(())
    }

    async fn put_bucket_policy(&self, _bucket: &BucketName, _policy: &str) -> StorageResult<()> {
        Err(StorageError::unsupported(
            "put_bucket_policy",
            "object_store backends have no access policies",
        ))
    }

    async fn get_bucket_policy(&self, _bucket: &BucketName) -> StorageResult<String> {
        Err(StorageError::unsupported(
            "get_bucket_policy",
            "object_store backends have no access policies",
        ))
    }

    async fn set_object_public_read(
        &self,
        _bucket: &BucketName,
        _key: &ObjectKey,
    ) -> StorageResult<()> {
        Err(StorageError::unsupported(
            "set_object_public_read",
            "object_store backends have no object ACLs",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("media").unwrap()
    }

    fn key(value: &str) -> ObjectKey {
        ObjectKey::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_basic_object_operations() {
        let adapter = ApacheObjectStoreAdapter::in_memory();
        adapter.create_bucket(&bucket(), None).await.unwrap();

        let put = adapter
            .put_object(&bucket(), &key("test/key.txt"), Bytes::from("test data"), Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(put.size, 9);

        let head = adapter.head_object(&bucket(), &key("test/key.txt")).await.unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));

        let copy = adapter
            .copy_object(&bucket(), &key("test/key.txt"), None, &key("other/key.txt"))
            .await
            .unwrap();
        assert_eq!(copy.size, 9);

        adapter.delete_object(&bucket(), &key("test/key.txt")).await.unwrap();
        let listed = adapter.list_objects_page(&bucket(), None, None).await.unwrap();
        assert_eq!(listed.items.len(), 1);
        assert_eq!(listed.items[0].key.as_str(), "other/key.txt");
    }

    #[tokio::test]
    async fn test_string_prefix_listing() {
        let adapter = ApacheObjectStoreAdapter::in_memory();
        adapter.create_bucket(&bucket(), None).await.unwrap();
        for name in ["photos/a.png", "photos2/b.png", "docs/c.txt"] {
            adapter
                .put_object(&bucket(), &key(name), Bytes::from("x"), None)
                .await
                .unwrap();
        }

        let page = adapter
            .list_objects_page(&bucket(), Some("photo"), None)
            .await
            .unwrap();
        let keys: Vec<_> = page.items.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["photos/a.png", "photos2/b.png"]);
    }

    #[tokio::test]
    async fn test_out_of_order_parts_are_assembled_in_order() {
        let adapter = ApacheObjectStoreAdapter::in_memory();
        adapter.create_bucket(&bucket(), None).await.unwrap();

        let upload_id = adapter
            .create_multipart_upload(&bucket(), &key("big.bin"), None)
            .await
            .unwrap();
        let second = adapter
            .upload_part(&bucket(), &key("big.bin"), &upload_id, 2, Bytes::from("world"))
            .await
            .unwrap();
        let first = adapter
            .upload_part(&bucket(), &key("big.bin"), &upload_id, 1, Bytes::from("hello "))
            .await
            .unwrap();

        let parts = [
            PartRecord {
                part_number: 1,
                checksum_tag: first,
                byte_length: 6,
            },
            PartRecord {
                part_number: 2,
                checksum_tag: second,
                byte_length: 5,
            },
        ];
        let done = adapter
            .complete_multipart_upload(&bucket(), &key("big.bin"), &upload_id, &parts)
            .await
            .unwrap();
        assert_eq!(done.size, 11);
        assert_eq!(
            adapter.get_object(&bucket(), &key("big.bin"), None).await.unwrap(),
            Bytes::from("hello world")
        );
    }

    #[tokio::test]
    async fn test_local_buckets_are_directories() {
        let root = tempfile::tempdir().unwrap();
        let adapter = ApacheObjectStoreAdapter::local(root.path()).unwrap();
        adapter.create_bucket(&bucket(), None).await.unwrap();
        assert!(root.path().join("media").is_dir());

        adapter
            .put_object(&bucket(), &key("a/b.txt"), Bytes::from("abc"), Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(root.path().join("media/a/b.txt")).unwrap(),
            b"abc"
        );

        let versions = adapter
            .list_versions_page(&bucket(), &key("a/b.txt"), None)
            .await
            .unwrap();
        assert_eq!(versions.items.len(), 1);
        assert!(versions.items[0].version_id.is_null());

        let err = adapter.delete_bucket(&bucket()).await.unwrap_err();
        assert_eq!(err.code(), "Conflict");
        assert_eq!(
            adapter.set_versioning(&bucket(), true).await.unwrap_err().code(),
            "Unsupported"
        );
    }
}
