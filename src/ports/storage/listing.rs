use std::{future::Future, sync::Arc};

use futures::{
    stream::{self, BoxStream},
    StreamExt, TryStreamExt,
};

use super::object_store::{ObjectStore, Page};
use crate::domain::{
    errors::{StorageError, StorageResult},
    models::{ObjectSummary, ObjectVersion},
    value_objects::{BucketName, ObjectKey},
};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Turn a page fetcher into a flat stream of items. Nothing is requested
/// until the stream is polled, and the next page only once the current one
/// is drained.
fn paginate<T, F, Fut>(fetch: F) -> BoxStream<'static, StorageResult<T>>
where
    T: Send + 'static,
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = StorageResult<Page<T>>> + Send + 'static,
{
    stream::try_unfold((Cursor::Start, fetch), |(cursor, mut fetch)| async move {
        let token = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok::<_, StorageError>(None),
        };

        let page = fetch(token).await?;
        let cursor = match page.next {
            Some(next) => Cursor::Next(next),
            None => Cursor::Done,
        };

        let items = stream::iter(page.items.into_iter().map(Ok));
        Ok(Some((items, (cursor, fetch))))
    })
    .try_flatten()
    .boxed()
}

/// Every object of a bucket, optionally restricted to a prefix.
///
/// Each call starts a fresh listing from the first page.
pub fn object_listing(
    store: Arc<dyn ObjectStore>,
    bucket: BucketName,
    prefix: Option<String>,
) -> BoxStream<'static, StorageResult<ObjectSummary>> {
    paginate(move |token| {
        let store = store.clone();
        let bucket = bucket.clone();
        let prefix = prefix.clone();
        async move {
            store
                .list_objects_page(&bucket, prefix.as_deref(), token)
                .await
        }
    })
}

/// Every version (and delete marker) of one key
pub fn version_listing(
    store: Arc<dyn ObjectStore>,
    bucket: BucketName,
    key: ObjectKey,
) -> BoxStream<'static, StorageResult<ObjectVersion>> {
    paginate(move |token| {
        let store = store.clone();
        let bucket = bucket.clone();
        let key = key.clone();
        async move { store.list_versions_page(&bucket, &key, token).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_paginate_is_lazy_and_follows_tokens() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let stream = paginate(move |token: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match token.as_deref() {
                    None => Page {
                        items: vec![1, 2],
                        next: Some("p2".to_string()),
                    },
                    Some("p2") => Page {
                        items: vec![],
                        next: Some("p3".to_string()),
                    },
                    _ => Page::last(vec![3]),
                })
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let items: Vec<i32> = stream.try_collect().await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_paginate_stops_on_error() {
        let stream = paginate(|token: Option<String>| async move {
            match token {
                None => Ok(Page {
                    items: vec![1],
                    next: Some("boom".to_string()),
                }),
                Some(_) => Err(StorageError::Transient {
                    message: "throttled".to_string(),
                }),
            }
        });

        let results: Vec<StorageResult<i32>> = stream.collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_retryable());
    }
}
