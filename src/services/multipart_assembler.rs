use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::FuturesUnordered, StreamExt};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    app::MultipartConfig,
    domain::{
        errors::UploadError,
        models::{ObjectDescriptor, PartRecord, UploadProgress, UploadSession},
        value_objects::{BucketName, ObjectKey},
    },
    ports::{
        services::{Payload, ProgressCallback, UploadRequest, UploadService},
        storage::ObjectStore,
    },
};

/// Uploads a payload as numbered parts and assembles it with one completion
/// call
#[derive(Clone)]
pub struct MultipartAssembler {
    store: Arc<dyn ObjectStore>,
    config: MultipartConfig,
}

impl MultipartAssembler {
    pub fn new(store: Arc<dyn ObjectStore>, config: MultipartConfig) -> Self {
        Self { store, config }
    }

    fn validate(&self, request: &UploadRequest) -> Result<(), UploadError> {
        if request.part_size < self.config.min_part_size
            || request.part_size > self.config.max_part_size
        {
            return Err(UploadError::InvalidPartSize {
                requested: request.part_size,
                minimum: self.config.min_part_size,
                maximum: self.config.max_part_size,
            });
        }

        if let Some(total) = request.total_bytes {
            if total.div_ceil(request.part_size) > u64::from(self.config.max_parts) {
                return Err(UploadError::TooManyParts {
                    max_parts: self.config.max_parts,
                    part_size: request.part_size,
                });
            }
        }

        Ok(())
    }

    /// Stream parts into an open session and complete it
    async fn drive(
        &self,
        session: &mut UploadSession,
        first: Bytes,
        payload: &mut Payload,
        request: &UploadRequest,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ObjectDescriptor, UploadError> {
        let concurrency = self.config.concurrency.max(1);
        let mut bytes_read = first.len() as u64;

        let mut pending = Some(first);
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < concurrency {
                let Some(chunk) = pending.take() else {
                    break;
                };

                if cancel.is_cancelled() {
                    return Err(UploadError::Cancelled {
                        parts_committed: session.committed_parts(),
                    });
                }

                let part_number = session.next_part_number();
                if part_number > self.config.max_parts {
                    return Err(UploadError::TooManyParts {
                        max_parts: self.config.max_parts,
                        part_size: request.part_size,
                    });
                }

                debug!(part_number, bytes = chunk.len(), "dispatching part");
                in_flight.push(commit_part(
                    self.store.clone(),
                    session.bucket.clone(),
                    session.key.clone(),
                    session.upload_id.clone(),
                    part_number,
                    chunk,
                ));

                let remaining = request.total_bytes.map(|total| total.saturating_sub(bytes_read));
                let next = read_chunk(payload, request.part_size, remaining)
                    .await
                    .map_err(|source| UploadError::Read {
                        part_number: part_number + 1,
                        source,
                    })?;
                bytes_read += next.len() as u64;
                if !next.is_empty() {
                    pending = Some(next);
                }
            }

            let Some(committed) = in_flight.next().await else {
                break;
            };

            let record = committed?;
            let part_number = record.part_number;
            session
                .record_part(record)
                .map_err(|cause| UploadError::PartFailed { part_number, cause })?;

            if let Some(callback) = progress {
                callback(UploadProgress {
                    bytes_uploaded: session.bytes_committed(),
                    total_bytes: request.total_bytes,
                    parts_committed: session.committed_parts(),
                });
            }
        }

        let parts = session
            .completion_parts()
            .map_err(|cause| UploadError::CommitFailed { cause })?;

        let descriptor = self
            .store
            .complete_multipart_upload(&session.bucket, &session.key, &session.upload_id, &parts)
            .await
            .map_err(|cause| UploadError::CommitFailed { cause })?;

        session.mark_completed();
        Ok(descriptor)
    }

    async fn abort(&self, session: &mut UploadSession) {
        if let Err(err) = self
            .store
            .abort_multipart_upload(&session.bucket, &session.key, &session.upload_id)
            .await
        {
            warn!(
                upload_id = %session.upload_id,
                key = %session.key,
                error = %err,
                "failed to abort multipart upload"
            );
        }
        session.mark_aborted();
    }
}

#[async_trait]
impl UploadService for MultipartAssembler {
    #[instrument(
        skip_all,
        fields(bucket = %request.bucket, key = %request.key, part_size = request.part_size)
    )]
    async fn upload(
        &self,
        request: UploadRequest,
        mut payload: Payload,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<ObjectDescriptor, UploadError> {
        self.validate(&request)?;

        let first = read_chunk(&mut payload, request.part_size, request.total_bytes)
            .await
            .map_err(|source| UploadError::Read {
                part_number: 1,
                source,
            })?;

        // A part must carry at least one byte
        if first.is_empty() {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled { parts_committed: 0 });
            }
            info!("empty payload, storing with a single put");
            return self
                .store
                .put_object(
                    &request.bucket,
                    &request.key,
                    first,
                    request.content_type.as_deref(),
                )
                .await
                .map_err(|cause| UploadError::CommitFailed { cause });
        }

        let upload_id = self
            .store
            .create_multipart_upload(&request.bucket, &request.key, request.content_type.as_deref())
            .await
            .map_err(|source| UploadError::Open {
                key: request.key.clone(),
                source,
            })?;
        info!(%upload_id, "multipart upload opened");

        let mut session =
            UploadSession::open(upload_id, request.bucket.clone(), request.key.clone());

        match self
            .drive(
                &mut session,
                first,
                &mut payload,
                &request,
                progress.as_ref(),
                &cancel,
            )
            .await
        {
            Ok(descriptor) => {
                info!(
                    parts = session.committed_parts(),
                    bytes = descriptor.size,
                    "multipart upload completed"
                );
                Ok(descriptor)
            }
            Err(err) => {
                warn!(error = %err, "multipart upload failed, aborting");
                self.abort(&mut session).await;
                Err(err)
            }
        }
    }
}

async fn commit_part(
    store: Arc<dyn ObjectStore>,
    bucket: BucketName,
    key: ObjectKey,
    upload_id: String,
    part_number: u32,
    data: Bytes,
) -> Result<PartRecord, UploadError> {
    let byte_length = data.len() as u64;
    let checksum_tag = store
        .upload_part(&bucket, &key, &upload_id, part_number, data)
        .await
        .map_err(|cause| UploadError::PartFailed { part_number, cause })?;

    Ok(PartRecord {
        part_number,
        checksum_tag,
        byte_length,
    })
}

/// Upper bound on the buffer reserved ahead of reading a part
const MAX_RESERVE: u64 = 64 * 1024 * 1024;

/// Fill one part from the payload; a short chunk means the payload ended.
///
/// The buffer grows with the bytes actually read. Up front it reserves the
/// part size, capped by the known remainder of the payload and by
/// `MAX_RESERVE`.
async fn read_chunk(
    payload: &mut Payload,
    part_size: u64,
    remaining: Option<u64>,
) -> std::io::Result<Bytes> {
    let reserve = remaining
        .map_or(part_size, |left| left.min(part_size))
        .min(MAX_RESERVE);
    let mut buffer = Vec::with_capacity(usize::try_from(reserve).unwrap_or(0));
    payload.take(part_size).read_to_end(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}
