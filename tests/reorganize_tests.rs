use std::sync::Arc;

use bytes::Bytes;
use s3_housekeeper::{
    ports::{BucketAdmin, ObjectStore},
    AppBuilder, AppServices, BatchConfig, BucketName, ClassificationRule, InMemoryObjectStore,
    ObjectKey, ObjectService, StorageError, StoreOperation,
};
use tokio_util::sync::CancellationToken;

fn bucket() -> BucketName {
    BucketName::new("media").unwrap()
}

fn key(value: &str) -> ObjectKey {
    ObjectKey::new(value).unwrap()
}

async fn setup(store: InMemoryObjectStore, objects: &[(&str, &str)]) -> AppServices {
    store.create_bucket(&bucket(), None).await.unwrap();
    for (name, content_type) in objects {
        store
            .put_object(
                &bucket(),
                &key(name),
                Bytes::from(format!("contents of {}", name)),
                Some(content_type),
            )
            .await
            .unwrap();
    }

    AppBuilder::new()
        .with_batch(BatchConfig {
            concurrency: 2,
            delete_batch_size: 1000,
        })
        .build_with(Arc::new(store.clone()), Arc::new(store))
}

async fn keys(app: &AppServices) -> Vec<String> {
    app.objects
        .list_objects(&bucket(), None)
        .await
        .unwrap()
        .into_iter()
        .map(|summary| summary.key.to_string())
        .collect()
}

#[tokio::test]
async fn test_reorganize_by_content_type() {
    let store = InMemoryObjectStore::new();
    let app = setup(
        store.clone(),
        &[("photo.png", "image/png"), ("notes.txt", "text/plain; charset=utf-8")],
    )
    .await;

    let plan = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByContentType)
        .await
        .unwrap();
    assert_eq!(plan.len(), 2);

    let result = app.reorganizer.execute(&plan, CancellationToken::new()).await;
    assert!(result.is_complete_success());
    assert_eq!(keys(&app).await, vec!["image/photo.png", "text/notes.txt"]);

    // Content type travels with the copy
    let head = store.head_object(&bucket(), &key("image/photo.png")).await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("image/png"));

    // A second pass finds nothing to move
    let replan = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByContentType)
        .await
        .unwrap();
    assert!(replan.is_empty(), "bucket should already be organized");
}

#[tokio::test]
async fn test_reorganize_by_extension() {
    let app = setup(
        InMemoryObjectStore::new(),
        &[
            ("backups/a.b.tar.gz", "application/gzip"),
            ("README", "text/plain"),
            ("gz/already.gz", "application/gzip"),
        ],
    )
    .await;

    let plan = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByExtension)
        .await
        .unwrap();

    let moves: Vec<(String, String)> = plan
        .entries
        .iter()
        .map(|entry| (entry.source_key.to_string(), entry.destination_key.to_string()))
        .collect();
    assert_eq!(
        moves,
        vec![
            ("README".to_string(), "unclassified/README".to_string()),
            (
                "backups/a.b.tar.gz".to_string(),
                "gz/backups/a.b.tar.gz".to_string()
            ),
        ]
    );

    let result = app.reorganizer.execute(&plan, CancellationToken::new()).await;
    assert_eq!(result.succeeded.len(), 2);
    assert_eq!(
        keys(&app).await,
        vec!["gz/already.gz", "gz/backups/a.b.tar.gz", "unclassified/README"]
    );
}

#[tokio::test]
async fn test_copy_failure_is_reported_per_object() {
    let store = InMemoryObjectStore::new();
    let app = setup(
        store.clone(),
        &[
            ("key1.jpg", "image/jpeg"),
            ("key2.jpg", "image/jpeg"),
            ("key3.jpg", "image/jpeg"),
        ],
    )
    .await;
    store
        .fail_next(
            StoreOperation::CopyObject,
            Some("key2.jpg"),
            StorageError::PermissionDenied {
                operation: "CopyObject".to_string(),
                resource: "key2.jpg".to_string(),
            },
        )
        .await;

    let plan = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByExtension)
        .await
        .unwrap();
    let result = app.reorganizer.execute(&plan, CancellationToken::new()).await;

    assert_eq!(result.succeeded, vec![key("key1.jpg"), key("key3.jpg")]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].key, key("key2.jpg"));
    assert_eq!(result.failed[0].error.code(), "PermissionDenied");
    assert!(!result.is_complete_success());

    // The failed object stays where it was
    assert_eq!(
        keys(&app).await,
        vec!["jpg/key1.jpg", "jpg/key3.jpg", "key2.jpg"]
    );
}

#[tokio::test]
async fn test_cancelled_batch_skips_remaining_entries() {
    let app = setup(
        InMemoryObjectStore::new(),
        &[("a.png", "image/png"), ("b.png", "image/png")],
    )
    .await;

    let plan = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByExtension)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = app.reorganizer.execute(&plan, cancel).await;

    assert!(result.succeeded.is_empty());
    assert_eq!(result.skipped, vec![key("a.png"), key("b.png")]);
    assert!(result.was_cancelled());
    assert_eq!(keys(&app).await, vec!["a.png", "b.png"]);
}

#[tokio::test]
async fn test_plan_spans_listing_pages() {
    let objects: Vec<(String, &str)> = (0..7)
        .map(|i| (format!("doc-{}.pdf", i), "application/pdf"))
        .collect();
    let borrowed: Vec<(&str, &str)> = objects
        .iter()
        .map(|(name, content_type)| (name.as_str(), *content_type))
        .collect();
    let app = setup(InMemoryObjectStore::new().with_page_size(2), &borrowed).await;

    let plan = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByContentType)
        .await
        .unwrap();
    assert_eq!(plan.len(), 7);

    let result = app.reorganizer.execute(&plan, CancellationToken::new()).await;
    assert_eq!(result.succeeded.len(), 7);
    assert!(keys(&app).await.iter().all(|k| k.starts_with("application/")));
}

#[tokio::test]
async fn test_plan_rejects_overwriting_existing_object() {
    let app = setup(
        InMemoryObjectStore::new(),
        &[("a.png", "image/png"), ("png/a.png", "image/png")],
    )
    .await;

    let err = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByExtension)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "InvalidInput");
    // Nothing was touched
    assert_eq!(keys(&app).await, vec!["a.png", "png/a.png"]);
}

#[tokio::test]
async fn test_plan_on_missing_bucket_fails() {
    let store = InMemoryObjectStore::new();
    let app = AppBuilder::new().build_with(Arc::new(store.clone()), Arc::new(store));

    let err = app
        .reorganizer
        .plan(&bucket(), ClassificationRule::ByExtension)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
