use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use s3_housekeeper::{
    ports::{BucketAdmin, ObjectStore, ProgressCallback},
    AppBuilder, AppServices, BucketName, InMemoryObjectStore, MultipartConfig, ObjectKey,
    StorageError, StoreOperation, UploadError, UploadProgress, UploadRequest,
};
use tokio_util::sync::CancellationToken;

fn bucket() -> BucketName {
    BucketName::new("uploads").unwrap()
}

fn key() -> ObjectKey {
    ObjectKey::new("videos/big.bin").unwrap()
}

async fn setup(concurrency: usize) -> (InMemoryObjectStore, AppServices) {
    let store = InMemoryObjectStore::new();
    store.create_bucket(&bucket(), None).await.unwrap();

    let app = AppBuilder::new()
        .with_multipart(MultipartConfig {
            min_part_size: 1,
            max_part_size: 64,
            default_part_size: 5,
            max_parts: 100,
            concurrency,
        })
        .build_with(Arc::new(store.clone()), Arc::new(store.clone()));
    (store, app)
}

fn payload(data: &[u8]) -> s3_housekeeper::ports::Payload {
    Box::new(Cursor::new(data.to_vec()))
}

#[tokio::test]
async fn test_upload_assembles_parts_in_order() {
    let (store, app) = setup(1).await;
    let data: Vec<u8> = (0u8..23).collect();

    let seen: Arc<Mutex<Vec<UploadProgress>>> = Arc::default();
    let sink = seen.clone();
    let progress: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));

    let request = UploadRequest::new(bucket(), key(), 5)
        .with_total_bytes(23)
        .with_content_type("application/octet-stream");
    let object = app
        .uploads
        .upload(request, payload(&data), Some(progress), CancellationToken::new())
        .await
        .unwrap();

    // 5 + 5 + 5 + 5 + 3
    assert_eq!(object.size, 23);
    let stored = store.get_object(&bucket(), &key(), None).await.unwrap();
    assert_eq!(stored, Bytes::from(data));

    let head = store.head_object(&bucket(), &key()).await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("application/octet-stream"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen.last().unwrap().bytes_uploaded, 23);
    assert_eq!(seen.last().unwrap().total_bytes, Some(23));
    assert_eq!(store.open_uploads().await, 0);
}

#[tokio::test]
async fn test_concurrent_parts_keep_read_order() {
    let (store, app) = setup(4).await;
    let data: Vec<u8> = (0u8..=250).collect();

    app.uploads
        .upload(
            UploadRequest::new(bucket(), key(), 7),
            payload(&data),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let stored = store.get_object(&bucket(), &key(), None).await.unwrap();
    assert_eq!(stored, Bytes::from(data));
}

#[tokio::test]
async fn test_failed_part_aborts_and_leaves_no_object() {
    let (store, app) = setup(1).await;
    store
        .fail_after(
            StoreOperation::UploadPart,
            Some(key().as_str()),
            1,
            StorageError::PermissionDenied {
                operation: "UploadPart".to_string(),
                resource: key().to_string(),
            },
        )
        .await;

    let err = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), 5),
            payload(b"hello multipart world"),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        UploadError::PartFailed { part_number, cause } => {
            assert_eq!(part_number, 2);
            assert_eq!(cause.code(), "PermissionDenied");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.head_object(&bucket(), &key()).await.unwrap_err().is_not_found());
    assert_eq!(store.open_uploads().await, 0);
}

#[tokio::test]
async fn test_failed_completion_is_commit_failed() {
    let (store, app) = setup(1).await;
    store
        .fail_next(
            StoreOperation::CompleteMultipartUpload,
            None,
            StorageError::Transient {
                message: "SlowDown".to_string(),
            },
        )
        .await;

    let err = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), 5),
            payload(b"0123456789ab"),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::CommitFailed { .. }));
    assert!(store.head_object(&bucket(), &key()).await.is_err());
    assert_eq!(store.open_uploads().await, 0);
}

#[tokio::test]
async fn test_cancellation_before_second_part() {
    let (store, app) = setup(1).await;
    let cancel = CancellationToken::new();

    // Cancel as soon as the first part is committed
    let trigger = cancel.clone();
    let progress: ProgressCallback = Arc::new(move |_| trigger.cancel());

    let err = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), 5),
            payload(b"0123456789abcdef"),
            Some(progress),
            cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Cancelled { parts_committed: 1 }));
    assert!(store.head_object(&bucket(), &key()).await.is_err());
    assert_eq!(store.open_uploads().await, 0);
}

#[tokio::test]
async fn test_empty_payload_is_a_plain_put() {
    let (store, app) = setup(1).await;

    let object = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), 5),
            payload(b""),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(object.size, 0);
    assert_eq!(store.head_object(&bucket(), &key()).await.unwrap().size, 0);
}

#[tokio::test]
async fn test_part_size_below_minimum_is_rejected() {
    let store = InMemoryObjectStore::new();
    store.create_bucket(&bucket(), None).await.unwrap();
    let app = AppBuilder::new().build_with(Arc::new(store.clone()), Arc::new(store.clone()));

    let err = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), 1024),
            payload(b"data"),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::InvalidPartSize {
            requested: 1024,
            minimum: 5_242_880,
            ..
        }
    ));
    assert_eq!(err.code(), "InvalidInput");
}

#[tokio::test]
async fn test_oversized_part_is_rejected() {
    let store = InMemoryObjectStore::new();
    store.create_bucket(&bucket(), None).await.unwrap();
    let app = AppBuilder::new().build_with(Arc::new(store.clone()), Arc::new(store.clone()));

    let err = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), u64::MAX).with_total_bytes(10),
            payload(b"0123456789"),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::InvalidPartSize {
            requested: u64::MAX,
            maximum: 5_368_709_120,
            ..
        }
    ));
    assert_eq!(err.code(), "InvalidInput");
    assert_eq!(store.open_uploads().await, 0);
    assert!(store.head_object(&bucket(), &key()).await.is_err());
}

#[tokio::test]
async fn test_largest_allowed_part_reads_only_the_payload() {
    let (store, app) = setup(1).await;

    let object = app
        .uploads
        .upload(
            UploadRequest::new(bucket(), key(), 64).with_total_bytes(10),
            payload(b"0123456789"),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(object.size, 10);
    assert_eq!(
        store.get_object(&bucket(), &key(), None).await.unwrap(),
        Bytes::from_static(b"0123456789")
    );
}

#[tokio::test]
async fn test_open_failure_names_key() {
    let (store, app) = setup(1).await;
    let missing = BucketName::new("missing").unwrap();

    let err = app
        .uploads
        .upload(
            UploadRequest::new(missing, key(), 5),
            payload(b"0123456789"),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Open { .. }));
    assert_eq!(err.code(), "NotFound");
    assert_eq!(store.open_uploads().await, 0);
}
