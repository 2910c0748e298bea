use thiserror::Error;

use crate::domain::{
    errors::StorageError,
    value_objects::{BucketName, ObjectKey},
};

/// Failures of a multipart upload.
///
/// Whenever a session was opened before the failure, it has been aborted by
/// the time one of these is returned.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("part size {requested} bytes is outside the allowed {minimum} to {maximum} bytes")]
    InvalidPartSize {
        requested: u64,
        minimum: u64,
        maximum: u64,
    },

    #[error("payload needs more than {max_parts} parts of {part_size} bytes")]
    TooManyParts { max_parts: u32, part_size: u64 },

    #[error("failed to open multipart upload for '{key}': {source}")]
    Open {
        key: ObjectKey,
        #[source]
        source: StorageError,
    },

    #[error("part {part_number} failed: {cause}")]
    PartFailed {
        part_number: u32,
        #[source]
        cause: StorageError,
    },

    #[error("failed to complete multipart upload: {cause}")]
    CommitFailed {
        #[source]
        cause: StorageError,
    },

    #[error("failed to read payload for part {part_number}: {source}")]
    Read {
        part_number: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("upload cancelled after {parts_committed} committed parts")]
    Cancelled { parts_committed: usize },
}

impl UploadError {
    pub fn code(&self) -> &str {
        match self {
            UploadError::InvalidPartSize { .. } | UploadError::TooManyParts { .. } => {
                "InvalidInput"
            }
            UploadError::Open { source, .. } => source.code(),
            UploadError::PartFailed { .. } => "PartFailed",
            UploadError::CommitFailed { .. } => "CommitFailed",
            UploadError::Read { .. } => "ReadFailed",
            UploadError::Cancelled { .. } => "Cancelled",
        }
    }
}

/// Failures of version pruning and rollback
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("no version of '{key}' in bucket '{bucket}' matches '{selector}'")]
    NoSuchVersion {
        bucket: BucketName,
        key: ObjectKey,
        selector: String,
    },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl VersionError {
    pub fn code(&self) -> &str {
        match self {
            VersionError::NoSuchVersion { .. } => "NoSuchVersion",
            VersionError::InvalidInput { .. } => "InvalidInput",
            VersionError::Storage(err) => err.code(),
        }
    }
}

pub type VersionResult<T> = Result<T, VersionError>;
