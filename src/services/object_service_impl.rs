use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{ObjectDescriptor, ObjectSummary},
        value_objects::{BucketName, ObjectKey, VersionId},
    },
    ports::{
        services::{ImportRequest, ImportedObject, ObjectService},
        storage::{object_listing, ObjectStore},
    },
};

/// Some hosts refuse requests without a browser user agent
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

/// Media types `import_from_url` will store
pub const IMPORTABLE_MEDIA_TYPES: [&str; 5] = [
    "image/bmp",
    "image/jpeg",
    "image/png",
    "image/webp",
    "video/mp4",
];

/// Implementation of ObjectService for managing object storage operations
#[derive(Clone)]
pub struct ObjectServiceImpl {
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
}

impl ObjectServiceImpl {
    /// Create a new ObjectServiceImpl instance
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, url: &str) -> StorageResult<Bytes> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|err| fetch_error(url, err))?
            .error_for_status()
            .map_err(|err| fetch_error(url, err))?;

        response.bytes().await.map_err(|err| fetch_error(url, err))
    }

    /// Store already downloaded bytes the way `import_from_url` does
    pub async fn import_bytes(
        &self,
        request: &ImportRequest,
        data: Bytes,
    ) -> StorageResult<ImportedObject> {
        let detected = sniff_media_type(&data);
        let content_type = detected
            .filter(|media_type| IMPORTABLE_MEDIA_TYPES.contains(media_type))
            .ok_or_else(|| {
                StorageError::invalid_input(format!(
                    "file type not allowed: {}",
                    detected.unwrap_or("unknown")
                ))
            })?;

        let object = self
            .store
            .put_object(&request.bucket, &request.key, data.clone(), Some(content_type))
            .await?;

        if let Some(path) = &request.keep_local {
            tokio::fs::write(path, &data)
                .await
                .map_err(|err| StorageError::Backend {
                    code: "LocalWriteFailed".to_string(),
                    message: format!("{}: {}", path.display(), err),
                })?;
        }

        let url = self.store.object_url(&request.bucket, &request.key);
        info!(%url, content_type, bytes = object.size, "object imported");

        Ok(ImportedObject {
            object,
            content_type: content_type.to_string(),
            url,
        })
    }
}

#[async_trait]
impl ObjectService for ObjectServiceImpl {
    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectSummary>> {
        object_listing(
            self.store.clone(),
            bucket.clone(),
            prefix.map(str::to_string),
        )
        .try_collect()
        .await
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectDescriptor> {
        self.store.put_object(bucket, key, data, content_type).await
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Bytes> {
        self.store.get_object(bucket, key, version_id).await
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<()> {
        self.store.delete_object(bucket, key).await
    }

    async fn object_exists(&self, bucket: &BucketName, key: &ObjectKey) -> StorageResult<bool> {
        match self.store.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(bucket = %request.bucket, key = %request.key, url = %request.url))]
    async fn import_from_url(&self, request: ImportRequest) -> StorageResult<ImportedObject> {
        let data = self.fetch(&request.url).await?;
        self.import_bytes(&request, data).await.inspect_err(|err| {
            warn!(error = %err, "import rejected");
        })
    }
}

fn fetch_error(url: &str, err: reqwest::Error) -> StorageError {
    match err.status() {
        Some(status) if status == reqwest::StatusCode::NOT_FOUND => StorageError::NotFound {
            resource: url.to_string(),
        },
        Some(status) if status == reqwest::StatusCode::FORBIDDEN
            || status == reqwest::StatusCode::UNAUTHORIZED =>
        {
            StorageError::PermissionDenied {
                operation: "download".to_string(),
                resource: url.to_string(),
            }
        }
        Some(status) if status.is_server_error() => StorageError::Transient {
            message: format!("{} returned {}", url, status),
        },
        Some(status) => StorageError::Backend {
            code: status.as_u16().to_string(),
            message: format!("{} returned {}", url, status),
        },
        None if err.is_timeout() || err.is_connect() => StorageError::Transient {
            message: format!("{}: {}", url, err),
        },
        None if err.is_builder() => StorageError::invalid_input(format!("bad url {}: {}", url, err)),
        None => StorageError::Backend {
            code: "DownloadFailed".to_string(),
            message: format!("{}: {}", url, err),
        },
    }
}

/// Detect a media type from the leading bytes of a file
pub fn sniff_media_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") {
        return match &data[8..12] {
            b"WEBP" => Some("image/webp"),
            b"WAVE" => Some("audio/x-wav"),
            b"AVI " => Some("video/x-msvideo"),
            _ => None,
        };
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            b"isom" | b"iso2" | b"iso5" | b"iso6" | b"mp41" | b"mp42" | b"avc1" | b"dash"
            | b"MSNV" | b"NDAS" | b"M4V " | b"M4VH" | b"M4VP" | b"F4V " => Some("video/mp4"),
            b"qt  " => Some("video/quicktime"),
            b"M4A " => Some("audio/mp4"),
            b"heic" | b"heix" | b"mif1" => Some("image/heic"),
            b"avif" => Some("image/avif"),
            _ => None,
        };
    }
    if data.starts_with(b"BM") && data.len() >= 14 {
        return Some("image/bmp");
    }
    if data.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    if data.starts_with(&[b'P', b'K', 0x03, 0x04]) {
        return Some("application/zip");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_allowed_media() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(sniff_media_type(&png), Some("image/png"));
        assert_eq!(sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_media_type(b"RIFF\x24\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_media_type(b"\0\0\0\x18ftypmp42\0\0\0\0"), Some("video/mp4"));
        assert_eq!(sniff_media_type(b"BM\x36\0\0\0\0\0\0\0\x36\0\0\0"), Some("image/bmp"));
    }

    #[test]
    fn test_sniff_other_types() {
        assert_eq!(sniff_media_type(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_media_type(b"%PDF-1.7"), Some("application/pdf"));
        assert_eq!(sniff_media_type(b"\0\0\0\x14ftypqt  \0\0"), Some("video/quicktime"));
        assert_eq!(sniff_media_type(b"plain text"), None);
        assert_eq!(sniff_media_type(&[]), None);
    }

    #[test]
    fn test_importable_types() {
        assert!(IMPORTABLE_MEDIA_TYPES.contains(&"image/webp"));
        assert!(!IMPORTABLE_MEDIA_TYPES.contains(&"image/gif"));
    }
}
