use async_trait::async_trait;
use aws_sdk_s3::{
    primitives::{ByteStream, DateTime as SmithyDateTime},
    types::{
        BucketLocationConstraint, BucketVersioningStatus, CompletedMultipartUpload,
        CompletedPart, CreateBucketConfiguration, Delete, ObjectCannedAcl,
        ObjectIdentifier as S3ObjectIdentifier, VersioningConfiguration,
    },
    Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, warn};

use super::S3Config;
use crate::{
    adapters::outbound::storage::error::{map_sdk_error, map_service_error},
    domain::{
        errors::{StorageError, StorageResult},
        models::{
            BulkDeleteOutcome, BucketInfo, ObjectDescriptor, ObjectHead, ObjectIdentifier,
            ObjectSummary, ObjectVersion, PartRecord,
        },
        value_objects::{BucketName, ObjectKey, VersionId},
    },
    ports::storage::{BucketAdmin, ObjectStore, Page},
};

/// S3 limit on keys per DeleteObjects request
pub const MAX_DELETE_BATCH: usize = 1000;

/// Characters left as-is in key paths; `/` keeps its meaning as separator
const KEY_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Separates key marker and version marker inside a continuation token
const MARKER_SEPARATOR: char = '\0';

/// Object storage backed by S3 or an S3-compatible service
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    region: String,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    pub fn new(client: Client, region: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            client,
            region: region.into(),
            endpoint,
        }
    }

    pub fn from_config(config: &S3Config) -> StorageResult<Self> {
        let client = config.build_client()?;
        Ok(Self::new(client, config.region.clone(), config.endpoint.clone()))
    }

    fn copy_source(bucket: &BucketName, key: &ObjectKey, version: Option<&VersionId>) -> String {
        let encoded = utf8_percent_encode(key.as_str(), KEY_PATH);
        match version {
            Some(version) => format!("{}/{}?versionId={}", bucket, encoded, version),
            None => format!("{}/{}", bucket, encoded),
        }
    }
}

fn bucket_resource(bucket: &BucketName) -> String {
    format!("bucket '{}'", bucket)
}

fn object_resource(bucket: &BucketName, key: &ObjectKey) -> String {
    format!("object '{}' in bucket '{}'", key, bucket)
}

fn timestamp(value: Option<&SmithyDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|value| DateTime::from_timestamp(value.secs(), value.subsec_nanos()))
}

fn byte_size(value: Option<i64>) -> u64 {
    value.map_or(0, |size| u64::try_from(size).unwrap_or(0))
}

/// Version ids reported for unversioned writes are dropped
fn written_version(value: Option<&str>) -> Option<VersionId> {
    value
        .filter(|version| *version != VersionId::NULL)
        .and_then(|version| VersionId::new(version).ok())
}

fn listed_version(
    key: &ObjectKey,
    version_id: Option<&str>,
    last_modified: Option<&SmithyDateTime>,
    size: u64,
    etag: Option<&str>,
    is_latest: Option<bool>,
    is_delete_marker: bool,
) -> StorageResult<ObjectVersion> {
    Ok(ObjectVersion {
        version_id: VersionId::new(version_id.unwrap_or(VersionId::NULL))?,
        key: key.clone(),
        last_modified: timestamp(last_modified).unwrap_or_else(Utc::now),
        size,
        etag: etag.map(str::to_string),
        is_latest: is_latest.unwrap_or(false),
        is_delete_marker,
    })
}

fn identifier_from(key: Option<&str>, version_id: Option<&str>) -> StorageResult<ObjectIdentifier> {
    let key = ObjectKey::new(key.unwrap_or_default())?;
    Ok(match version_id {
        Some(version) => ObjectIdentifier::version(key, VersionId::new(version)?),
        None => ObjectIdentifier::new(key),
    })
}

fn split_version_token(token: &str) -> (Option<String>, Option<String>) {
    match token.split_once(MARKER_SEPARATOR) {
        Some((key_marker, version_marker)) => (
            Some(key_marker.to_string()).filter(|m| !m.is_empty()),
            Some(version_marker.to_string()).filter(|m| !m.is_empty()),
        ),
        None => (Some(token.to_string()), None),
    }
}

/// Next version token, only while the listing is still inside `key`;
/// markers past it belong to other keys sharing the prefix
fn next_version_token(
    key: &ObjectKey,
    truncated: bool,
    next_key_marker: Option<&str>,
    next_version_marker: Option<&str>,
) -> Option<String> {
    if !truncated || next_key_marker != Some(key.as_str()) {
        return None;
    }
    Some(format!(
        "{}{}{}",
        key,
        MARKER_SEPARATOR,
        next_version_marker.unwrap_or_default()
    ))
}

fn build_error(err: aws_sdk_s3::error::BuildError) -> StorageError {
    StorageError::invalid_input(format!("malformed S3 request: {}", err))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects_page(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectSummary>> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket.as_str())
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;

        let items = output
            .contents()
            .iter()
            .map(|object| -> StorageResult<ObjectSummary> {
                Ok(ObjectSummary {
                    key: ObjectKey::new(object.key().unwrap_or_default())?,
                    size: byte_size(object.size()),
                    last_modified: timestamp(object.last_modified()).unwrap_or_else(Utc::now),
                    etag: object.e_tag().map(str::to_string),
                    content_type: None,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let next = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        debug!(bucket = %bucket, count = items.len(), more = next.is_some(), "Listed objects page");

        Ok(Page { items, next })
    }

    async fn list_versions_page(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        continuation: Option<String>,
    ) -> StorageResult<Page<ObjectVersion>> {
        let (key_marker, version_marker) = continuation
            .as_deref()
            .map(split_version_token)
            .unwrap_or((None, None));

        let output = self
            .client
            .list_object_versions()
            .bucket(bucket.as_str())
            .prefix(key.as_str())
            .set_key_marker(key_marker)
            .set_version_id_marker(version_marker)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;

        let mut items = Vec::new();
        for version in output.versions() {
            if version.key() != Some(key.as_str()) {
                continue;
            }
            items.push(listed_version(
                key,
                version.version_id(),
                version.last_modified(),
                byte_size(version.size()),
                version.e_tag(),
                version.is_latest(),
                false,
            )?);
        }
        for marker in output.delete_markers() {
            if marker.key() != Some(key.as_str()) {
                continue;
            }
            items.push(listed_version(
                key,
                marker.version_id(),
                marker.last_modified(),
                0,
                None,
                marker.is_latest(),
                true,
            )?);
        }

        let next = next_version_token(
            key,
            output.is_truncated().unwrap_or(false),
            output.next_key_marker(),
            output.next_version_id_marker(),
        );

        Ok(Page { items, next })
    }

    async fn head_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;

        Ok(ObjectHead {
            content_type: output.content_type().map(str::to_string),
            size: byte_size(output.content_length()),
            etag: output.e_tag().map(str::to_string),
            last_modified: timestamp(output.last_modified()).unwrap_or_else(Utc::now),
            version_id: written_version(output.version_id()),
        })
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Bytes> {
        let resource = object_resource(bucket, key);
        let output = self
            .client
            .get_object()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .set_version_id(version_id.map(|version| version.to_string()))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, resource.clone()))?;

        let data = output.body.collect().await.map_err(|err| StorageError::Transient {
            message: format!("failed reading {}: {}", resource, err),
        })?;
        Ok(data.into_bytes())
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectDescriptor> {
        let size = data.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;

        Ok(ObjectDescriptor {
            bucket: bucket.clone(),
            key: key.clone(),
            size,
            etag: output.e_tag().map(str::to_string),
            version_id: written_version(output.version_id()),
        })
    }

    async fn copy_object(
        &self,
        bucket: &BucketName,
        source_key: &ObjectKey,
        source_version: Option<&VersionId>,
        destination_key: &ObjectKey,
    ) -> StorageResult<ObjectDescriptor> {
        let output = self
            .client
            .copy_object()
            .bucket(bucket.as_str())
            .key(destination_key.as_str())
            .copy_source(Self::copy_source(bucket, source_key, source_version))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, source_key)))?;

        // CopyObject does not report the size
        let head = self.head_object(bucket, destination_key).await?;

        Ok(ObjectDescriptor {
            bucket: bucket.clone(),
            key: destination_key.clone(),
            size: head.size,
            etag: output
                .copy_object_result()
                .and_then(|result| result.e_tag())
                .map(str::to_string),
            version_id: written_version(output.version_id()),
        })
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &BucketName,
        identifiers: &[ObjectIdentifier],
    ) -> StorageResult<BulkDeleteOutcome> {
        let mut outcome = BulkDeleteOutcome::default();

        for batch in identifiers.chunks(MAX_DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|identifier| {
                    S3ObjectIdentifier::builder()
                        .key(identifier.key.as_str())
                        .set_version_id(identifier.version_id.as_ref().map(|v| v.to_string()))
                        .build()
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(build_error)?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(false)
                .build()
                .map_err(build_error)?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket.as_str())
                .delete(delete)
                .send()
                .await
                .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;

            for deleted in output.deleted() {
                outcome
                    .deleted
                    .push(identifier_from(deleted.key(), deleted.version_id())?);
            }
            for error in output.errors() {
                let identifier = identifier_from(error.key(), error.version_id())?;
                let mapped = map_service_error(
                    0,
                    error.code().unwrap_or_default(),
                    error.message().unwrap_or_default().to_string(),
                    identifier.to_string(),
                );
                warn!(bucket = %bucket, object = %identifier, error = %mapped, "Bulk delete entry failed");
                outcome.errors.push((identifier, mapped));
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
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Backend {
                code: "MissingUploadId".to_string(),
                message: format!("no upload id returned for {}", object_resource(bucket, key)),
            })
    }

    async fn upload_part(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let part_number = i32::try_from(part_number).map_err(|_| {
            StorageError::invalid_input(format!("part number {} out of range", part_number))
        })?;

        let output = self
            .client
            .upload_part()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, format!("upload '{}' of {}", upload_id, object_resource(bucket, key))))?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Backend {
                code: "MissingETag".to_string(),
                message: format!("part {} of upload {} returned no ETag", part_number, upload_id),
            })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<ObjectDescriptor> {
        let completed = parts
            .iter()
            .map(|part| -> StorageResult<CompletedPart> {
                let part_number = i32::try_from(part.part_number).map_err(|_| {
                    StorageError::invalid_input(format!(
                        "part number {} out of range",
                        part.part_number
                    ))
                })?;
                Ok(CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(&part.checksum_tag)
                    .build())
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;

        Ok(ObjectDescriptor {
            bucket: bucket.clone(),
            key: key.clone(),
            size: parts.iter().map(|part| part.byte_length).sum(),
            etag: output.e_tag().map(str::to_string),
            version_id: written_version(output.version_id()),
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;
        Ok(())
    }

    fn max_delete_batch(&self) -> usize {
        MAX_DELETE_BATCH
    }

    fn object_url(&self, bucket: &BucketName, key: &ObjectKey) -> String {
        let encoded = utf8_percent_encode(key.as_str(), KEY_PATH);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, encoded),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, encoded),
        }
    }
}

#[async_trait]
impl BucketAdmin for S3ObjectStore {
    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "bucket list"))?;

        let mut buckets = Vec::new();
        for bucket in output.buckets() {
            let raw = bucket.name().unwrap_or_default();
            match BucketName::new(raw) {
                Ok(name) => buckets.push(BucketInfo {
                    name,
                    created_at: timestamp(bucket.creation_date()),
                }),
                Err(err) => warn!(bucket = raw, error = %err, "Skipping bucket with unsupported name"),
            }
        }
        Ok(buckets)
    }

    async fn create_bucket(&self, bucket: &BucketName, region: Option<&str>) -> StorageResult<()> {
        let region = region.unwrap_or(&self.region);
        let mut request = self.client.create_bucket().bucket(bucket.as_str());
        // us-east-1 rejects an explicit location constraint
        if region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;
        debug!(bucket = %bucket, region, "Created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket.as_str())
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket.to_string()))?;
        Ok(())
    }

    async fn head_bucket(&self, bucket: &BucketName) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket.as_str())
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;
        Ok(())
    }

    async fn set_versioning(&self, bucket: &BucketName, enabled: bool) -> StorageResult<()> {
        let status = if enabled {
            BucketVersioningStatus::Enabled
        } else {
            BucketVersioningStatus::Suspended
        };

        self.client
            .put_bucket_versioning()
            .bucket(bucket.as_str())
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &BucketName, policy: &str) -> StorageResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket.as_str())
            .policy(policy)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket_resource(bucket)))?;
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &BucketName) -> StorageResult<String> {
        let resource = format!("policy of bucket '{}'", bucket);
        let output = self
            .client
            .get_bucket_policy()
            .bucket(bucket.as_str())
            .send()
            .await
            .map_err(|err| map_sdk_error(err, resource.clone()))?;

        output
            .policy()
            .map(str::to_string)
            .ok_or(StorageError::NotFound { resource })
    }

    async fn set_object_public_read(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageResult<()> {
        self.client
            .put_object_acl()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, object_resource(bucket, key)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: &str) -> ObjectKey {
        ObjectKey::new(value).unwrap()
    }

    fn store(endpoint: Option<&str>) -> S3ObjectStore {
        let mut config = S3Config::new("eu-west-1", "key", "secret");
        config.endpoint = endpoint.map(str::to_string);
        S3ObjectStore::from_config(&config).unwrap()
    }

    #[test]
    fn test_object_url_addressing() {
        let bucket = BucketName::new("photos").unwrap();

        let aws = store(None);
        assert_eq!(
            aws.object_url(&bucket, &key("2024/my cat.png")),
            "https://photos.s3.eu-west-1.amazonaws.com/2024/my%20cat.png"
        );

        let minio = store(Some("http://localhost:9000/"));
        assert_eq!(
            minio.object_url(&bucket, &key("a+b.txt")),
            "http://localhost:9000/photos/a%2Bb.txt"
        );
    }

    #[test]
    fn test_copy_source_carries_version() {
        let bucket = BucketName::new("photos").unwrap();
        let version = VersionId::new("3HL4kqtJ").unwrap();

        assert_eq!(
            S3ObjectStore::copy_source(&bucket, &key("dir/a b.jpg"), None),
            "photos/dir/a%20b.jpg"
        );
        assert_eq!(
            S3ObjectStore::copy_source(&bucket, &key("a.jpg"), Some(&version)),
            "photos/a.jpg?versionId=3HL4kqtJ"
        );
    }

    #[test]
    fn test_version_token_stays_within_key() {
        let report = key("report.csv");

        let token = next_version_token(&report, true, Some("report.csv"), Some("v9")).unwrap();
        assert_eq!(
            split_version_token(&token),
            (Some("report.csv".to_string()), Some("v9".to_string()))
        );

        // The next page starts at a sibling key
        assert_eq!(
            next_version_token(&report, true, Some("report.csv.bak"), Some("v1")),
            None
        );
        assert_eq!(next_version_token(&report, false, Some("report.csv"), None), None);
    }

    #[test]
    fn test_listed_versions_default_to_null_id() {
        let version = listed_version(&key("a.txt"), None, None, 4, Some("\"e\""), None, false).unwrap();
        assert!(version.version_id.is_null());
        assert!(!version.is_latest);

        let stamp = SmithyDateTime::from_secs(1_700_000_000);
        let marker =
            listed_version(&key("a.txt"), Some("m1"), Some(&stamp), 0, None, Some(true), true)
                .unwrap();
        assert_eq!(marker.last_modified.timestamp(), 1_700_000_000);
        assert!(marker.is_delete_marker);
        assert!(marker.is_latest);
    }

    #[test]
    fn test_identifier_from_bulk_delete_entry() {
        let plain = identifier_from(Some("a.txt"), None).unwrap();
        assert_eq!(plain, ObjectIdentifier::new(key("a.txt")));

        let versioned = identifier_from(Some("a.txt"), Some("v1")).unwrap();
        assert_eq!(versioned.to_string(), "a.txt@v1");

        assert!(identifier_from(None, None).is_err());
    }

    #[test]
    fn test_written_version_drops_null() {
        assert_eq!(written_version(Some("null")), None);
        assert_eq!(written_version(None), None);
        assert_eq!(
            written_version(Some("v2")),
            Some(VersionId::new("v2").unwrap())
        );
    }
}
