use crate::domain::{
    errors::ValidationError,
    value_objects::{BucketName, ObjectKey, VersionId},
};

/// Errors reported by an object store.
///
/// Every variant maps to a machine-readable [`code`](StorageError::code) and a
/// human message. Adapters translate their backend failures into this
/// taxonomy so services never see vendor error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Bucket, object, version or upload absent
    NotFound { resource: String },

    /// The request conflicts with the current state (e.g. bucket not empty)
    Conflict { message: String },

    /// Credentials are missing, invalid, or lack the permission
    PermissionDenied { operation: String, resource: String },

    /// Network failure or throttling; safe to retry at the caller's discretion
    Transient { message: String },

    /// Malformed request, value or argument
    InvalidInput { message: String },

    /// The backend cannot perform this operation
    Unsupported { operation: String, reason: String },

    /// Any other backend failure, carrying the backend's own code
    Backend { code: String, message: String },
}

impl StorageError {
    pub fn bucket_not_found(bucket: &BucketName) -> Self {
        StorageError::NotFound {
            resource: format!("bucket '{}'", bucket),
        }
    }

    pub fn object_not_found(bucket: &BucketName, key: &ObjectKey) -> Self {
        StorageError::NotFound {
            resource: format!("object '{}' in bucket '{}'", key, bucket),
        }
    }

    pub fn version_not_found(bucket: &BucketName, key: &ObjectKey, version: &VersionId) -> Self {
        StorageError::NotFound {
            resource: format!(
                "version '{}' of object '{}' in bucket '{}'",
                version, key, bucket
            ),
        }
    }

    pub fn upload_not_found(upload_id: &str) -> Self {
        StorageError::NotFound {
            resource: format!("multipart upload '{}'", upload_id),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        StorageError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &str {
        match self {
            StorageError::NotFound { .. } => "NotFound",
            StorageError::Conflict { .. } => "Conflict",
            StorageError::PermissionDenied { .. } => "PermissionDenied",
            StorageError::Transient { .. } => "Transient",
            StorageError::InvalidInput { .. } => "InvalidInput",
            StorageError::Unsupported { .. } => "Unsupported",
            StorageError::Backend { code, .. } => code,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Only transient failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound { resource } => {
                write!(f, "Not found: {}", resource)
            }
            StorageError::Conflict { message } => {
                write!(f, "Conflict: {}", message)
            }
            StorageError::PermissionDenied {
                operation,
                resource,
            } => {
                write!(
                    f,
                    "Permission denied for operation '{}' on {}",
                    operation, resource
                )
            }
            StorageError::Transient { message } => {
                write!(f, "Transient storage failure: {}", message)
            }
            StorageError::InvalidInput { message } => {
                write!(f, "Invalid input: {}", message)
            }
            StorageError::Unsupported { operation, reason } => {
                write!(f, "Unsupported operation '{}': {}", operation, reason)
            }
            StorageError::Backend { code, message } => {
                write!(f, "Storage backend error [{}]: {}", code, message)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        StorageError::InvalidInput {
            message: err.to_string(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
