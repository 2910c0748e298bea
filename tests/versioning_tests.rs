use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use s3_housekeeper::{
    ports::{BucketAdmin, ObjectStore},
    AppBuilder, AppServices, BucketName, InMemoryObjectStore, ObjectKey, StorageError,
    StoreOperation, VersionError, VersionSelector,
};
use tokio_util::sync::CancellationToken;

fn bucket() -> BucketName {
    BucketName::new("archive").unwrap()
}

fn key() -> ObjectKey {
    ObjectKey::new("reports/q3.csv").unwrap()
}

async fn setup(versioned: bool) -> (InMemoryObjectStore, AppServices) {
    let store = InMemoryObjectStore::new();
    store.create_bucket(&bucket(), None).await.unwrap();
    if versioned {
        store.set_versioning(&bucket(), true).await.unwrap();
    }
    let app = AppBuilder::new().build_with(Arc::new(store.clone()), Arc::new(store.clone()));
    (store, app)
}

/// Writes three versions, 30, 10 and 1 days old
async fn seed_history(store: &InMemoryObjectStore) {
    let now = Utc::now();
    for (days, body) in [(30, "v1"), (10, "v2"), (1, "v3")] {
        store
            .put_object_at(
                &bucket(),
                &key(),
                Bytes::from(body),
                Some("text/csv"),
                now - Duration::days(days),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_history_is_oldest_first() {
    let (store, app) = setup(true).await;
    seed_history(&store).await;

    let history = app.versions.list_versions(&bucket(), &key()).await.unwrap();
    assert_eq!(history.len(), 3);

    let versions = history.versions();
    assert!(versions[0].last_modified < versions[1].last_modified);
    assert!(versions[1].last_modified < versions[2].last_modified);
    assert!(versions[2].is_latest);
    assert!(!versions[0].is_latest);
}

#[tokio::test]
async fn test_prune_deletes_only_versions_past_cutoff() {
    let (store, app) = setup(true).await;
    seed_history(&store).await;
    let oldest = app.versions.list_versions(&bucket(), &key()).await.unwrap().versions()[0]
        .version_id
        .clone();

    let report = app
        .versions
        .prune_older_than(&bucket(), &key(), Duration::days(20), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.count(), 1);
    assert_eq!(report.deleted, vec![oldest]);
    assert!(report.is_complete_success());

    let history = app.versions.list_versions(&bucket(), &key()).await.unwrap();
    assert_eq!(history.len(), 2);

    // Latest content untouched
    let latest = store.get_object(&bucket(), &key(), None).await.unwrap();
    assert_eq!(latest, Bytes::from("v3"));
}

#[tokio::test]
async fn test_prune_with_nothing_old_enough() {
    let (store, app) = setup(true).await;
    seed_history(&store).await;

    let report = app
        .versions
        .prune_older_than(&bucket(), &key(), Duration::days(90), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.count(), 0);
    assert_eq!(app.versions.list_versions(&bucket(), &key()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_prune_records_per_version_failures() {
    let (store, app) = setup(true).await;
    seed_history(&store).await;
    store
        .fail_next(
            StoreOperation::DeleteObjects,
            Some(key().as_str()),
            StorageError::PermissionDenied {
                operation: "DeleteObjects".to_string(),
                resource: key().to_string(),
            },
        )
        .await;

    let report = app
        .versions
        .prune_older_than(&bucket(), &key(), Duration::days(5), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.count(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].1.code(), "PermissionDenied");
    assert!(!report.is_complete_success());
    assert_eq!(app.versions.list_versions(&bucket(), &key()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_prune_rejects_non_positive_age() {
    let (_store, app) = setup(true).await;

    let err = app
        .versions
        .prune_older_than(&bucket(), &key(), Duration::zero(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VersionError::InvalidInput { .. }));
    assert_eq!(err.code(), "InvalidInput");
}

#[tokio::test]
async fn test_restore_previous_version() {
    let (store, app) = setup(true).await;
    store
        .put_object(&bucket(), &key(), Bytes::from("first draft"), None)
        .await
        .unwrap();
    store
        .put_object(&bucket(), &key(), Bytes::from("second draft"), None)
        .await
        .unwrap();

    let restored = app
        .versions
        .restore_version(&bucket(), &key(), &VersionSelector::Previous)
        .await
        .unwrap();

    let latest = store.get_object(&bucket(), &key(), None).await.unwrap();
    assert_eq!(latest, Bytes::from("first draft"));

    // Restoring adds a version rather than rewriting history
    let history = app.versions.list_versions(&bucket(), &key()).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.versions()[2].version_id, restored);
}

#[tokio::test]
async fn test_restore_earliest_and_by_id() {
    let (store, app) = setup(true).await;
    seed_history(&store).await;
    let history = app.versions.list_versions(&bucket(), &key()).await.unwrap();
    let middle = history.versions()[1].version_id.clone();

    app.versions
        .restore_version(&bucket(), &key(), &VersionSelector::Earliest)
        .await
        .unwrap();
    assert_eq!(
        store.get_object(&bucket(), &key(), None).await.unwrap(),
        Bytes::from("v1")
    );

    app.versions
        .restore_version(&bucket(), &key(), &VersionSelector::Id(middle))
        .await
        .unwrap();
    assert_eq!(
        store.get_object(&bucket(), &key(), None).await.unwrap(),
        Bytes::from("v2")
    );
}

#[tokio::test]
async fn test_restore_after_delete_marker() {
    let (store, app) = setup(true).await;
    store
        .put_object(&bucket(), &key(), Bytes::from("only copy"), None)
        .await
        .unwrap();
    store.delete_object(&bucket(), &key()).await.unwrap();
    assert!(store.get_object(&bucket(), &key(), None).await.is_err());

    app.versions
        .restore_version(&bucket(), &key(), &VersionSelector::Earliest)
        .await
        .unwrap();
    assert_eq!(
        store.get_object(&bucket(), &key(), None).await.unwrap(),
        Bytes::from("only copy")
    );
}

#[tokio::test]
async fn test_previous_needs_two_versions() {
    let (store, app) = setup(true).await;
    store
        .put_object(&bucket(), &key(), Bytes::from("lonely"), None)
        .await
        .unwrap();

    let err = app
        .versions
        .restore_version(&bucket(), &key(), &VersionSelector::Previous)
        .await
        .unwrap_err();

    assert!(matches!(err, VersionError::NoSuchVersion { .. }));
    assert_eq!(err.code(), "NoSuchVersion");
}

#[tokio::test]
async fn test_restore_on_unversioned_bucket_is_unsupported() {
    let (store, app) = setup(false).await;
    store
        .put_object(&bucket(), &key(), Bytes::from("plain"), None)
        .await
        .unwrap();

    let err = app
        .versions
        .restore_version(&bucket(), &key(), &VersionSelector::Earliest)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "Unsupported");
}
