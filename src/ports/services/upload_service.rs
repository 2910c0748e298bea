use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    errors::UploadError,
    models::{ObjectDescriptor, UploadProgress},
    value_objects::{BucketName, ObjectKey},
};

/// Byte source consumed by a multipart upload
pub type Payload = Box<dyn AsyncRead + Send + Unpin>;

/// Invoked after each committed part
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Parameters of one chunked upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub part_size: u64,
    /// Known payload length, reported back through progress callbacks
    pub total_bytes: Option<u64>,
    pub content_type: Option<String>,
}

impl UploadRequest {
    pub fn new(bucket: BucketName, key: ObjectKey, part_size: u64) -> Self {
        Self {
            bucket,
            key,
            part_size,
            total_bytes: None,
            content_type: None,
        }
    }

    pub fn with_total_bytes(mut self, total_bytes: u64) -> Self {
        self.total_bytes = Some(total_bytes);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Service port for uploading one large payload as numbered parts
#[async_trait]
pub trait UploadService: Send + Sync + 'static {
    /// Upload `payload` under `request.key`.
    ///
    /// On any error the multipart session has been aborted and the
    /// destination key was never written.
    async fn upload(
        &self,
        request: UploadRequest,
        payload: Payload,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<ObjectDescriptor, UploadError>;
}
