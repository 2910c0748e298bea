use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
};

use crate::domain::errors::StorageError;

/// Convert an S3 SDK failure into the domain taxonomy.
///
/// Throttling and 5xx responses reach this point only after the SDK's own
/// retries are exhausted.
pub fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, resource: impl Into<String>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let resource = resource.into();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StorageError::Transient {
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ConstructionFailure(_) => StorageError::InvalidInput {
            message: DisplayErrorContext(&err).to_string(),
        },
        _ => {
            let status = err
                .raw_response()
                .map(|response| response.status().as_u16())
                .unwrap_or_default();
            let code = err
                .as_service_error()
                .and_then(|service| service.code())
                .unwrap_or_default()
                .to_string();
            let message = err
                .as_service_error()
                .and_then(|service| service.message())
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            map_service_error(status, &code, message, resource)
        }
    }
}

/// Map an S3 error code, falling back to the HTTP status when the code is
/// unknown
pub fn map_service_error(
    status: u16,
    code: &str,
    message: String,
    resource: String,
) -> StorageError {
    match code {
        "NoSuchBucket" | "NoSuchKey" | "NoSuchVersion" | "NoSuchUpload"
        | "NoSuchBucketPolicy" | "NotFound" => StorageError::NotFound { resource },
        "BucketNotEmpty" => StorageError::Conflict {
            message: format!("bucket '{}' is not empty", resource),
        },
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" | "OperationAborted" => {
            StorageError::Conflict { message }
        }
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "AllAccessDisabled"
        | "ExpiredToken" => StorageError::PermissionDenied {
            operation: code.to_string(),
            resource,
        },
        "SlowDown" | "InternalError" | "ServiceUnavailable" | "RequestTimeout" => {
            StorageError::Transient { message }
        }
        "InvalidArgument" | "InvalidRequest" | "MalformedXML" | "InvalidPart"
        | "InvalidPartOrder" | "EntityTooSmall" | "EntityTooLarge" | "InvalidBucketName"
        | "KeyTooLongError" => StorageError::InvalidInput { message },
        _ => match status {
            404 => StorageError::NotFound { resource },
            409 => StorageError::Conflict { message },
            401 | 403 => StorageError::PermissionDenied {
                operation: if code.is_empty() { status.to_string() } else { code.to_string() },
                resource,
            },
            429 | 500..=599 => StorageError::Transient { message },
            400 if code.is_empty() => StorageError::InvalidInput { message },
            _ => StorageError::Backend {
                code: if code.is_empty() {
                    status.to_string()
                } else {
                    code.to_string()
                },
                message,
            },
        },
    }
}

/// Convert object_store errors to domain storage errors
impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound { resource: path },
            object_store::Error::AlreadyExists { path, .. } => StorageError::Conflict {
                message: format!("'{}' already exists", path),
            },
            object_store::Error::Precondition { path, .. } => StorageError::Conflict {
                message: format!("precondition failed for '{}'", path),
            },
            object_store::Error::InvalidPath { source } => StorageError::InvalidInput {
                message: source.to_string(),
            },
            object_store::Error::NotSupported { source } => StorageError::Unsupported {
                operation: "object_store".to_string(),
                reason: source.to_string(),
            },
            object_store::Error::PermissionDenied { path, .. }
            | object_store::Error::Unauthenticated { path, .. } => {
                StorageError::PermissionDenied {
                    operation: "object_store".to_string(),
                    resource: path,
                }
            }
            other => StorageError::Backend {
                code: "ObjectStoreError".to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: u16, code: &str) -> StorageError {
        map_service_error(status, code, "msg".to_string(), "/bucket/key".to_string())
    }

    #[test]
    fn test_s3_codes_map_onto_taxonomy() {
        assert_eq!(service(404, "NoSuchKey").code(), "NotFound");
        assert_eq!(service(404, "NoSuchVersion").code(), "NotFound");
        assert_eq!(service(409, "BucketNotEmpty").code(), "Conflict");
        assert_eq!(service(403, "AccessDenied").code(), "PermissionDenied");
        assert_eq!(service(403, "SignatureDoesNotMatch").code(), "PermissionDenied");
        assert_eq!(service(503, "SlowDown").code(), "Transient");
        assert_eq!(service(400, "EntityTooSmall").code(), "InvalidInput");
        assert_eq!(service(400, "InvalidPartOrder").code(), "InvalidInput");
    }

    #[test]
    fn test_unknown_codes_fall_back_to_status() {
        assert_eq!(service(404, "").code(), "NotFound");
        assert_eq!(service(502, "").code(), "Transient");
        assert_eq!(service(429, "").code(), "Transient");
        assert!(service(500, "Weird").is_retryable());

        let err = service(400, "QuotaExceeded");
        assert_eq!(
            err,
            StorageError::Backend {
                code: "QuotaExceeded".to_string(),
                message: "msg".to_string(),
            }
        );
    }

    #[test]
    fn test_bucket_not_empty_names_bucket() {
        let err = map_service_error(409, "BucketNotEmpty", "msg".into(), "photos".into());
        assert_eq!(
            err,
            StorageError::Conflict {
                message: "bucket 'photos' is not empty".to_string(),
            }
        );
    }

    #[test]
    fn test_sdk_timeouts_are_transient() {
        use aws_sdk_s3::operation::get_object::GetObjectError;

        let err: SdkError<GetObjectError, HttpResponse> = SdkError::timeout_error("read timed out");
        let mapped = map_sdk_error(err, "media/a.png");
        assert_eq!(mapped.code(), "Transient");
        assert!(mapped.is_retryable());
    }

    #[test]
    fn test_object_store_errors() {
        let err: StorageError = object_store::Error::NotFound {
            path: "a/b".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(err.is_not_found());

        let err: StorageError = object_store::Error::AlreadyExists {
            path: "a/b".to_string(),
            source: "exists".into(),
        }
        .into();
        assert_eq!(err.code(), "Conflict");
    }
}
