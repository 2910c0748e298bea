use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    app::BatchConfig,
    domain::{
        errors::{StorageError, StorageResult},
        models::{
            BatchFailure, BatchResult, ClassificationRule, PlanEntry, ReorganizePlan,
        },
        value_objects::{BucketName, ObjectKey},
    },
    ports::{
        services::ReorganizeService,
        storage::{object_listing, ObjectStore},
    },
};

enum EntryOutcome {
    Moved,
    Failed(StorageError),
    Skipped,
}

/// Re-keys a bucket's objects into folders derived from a classification
/// rule
#[derive(Clone)]
pub struct BatchReorganizer {
    store: Arc<dyn ObjectStore>,
    config: BatchConfig,
}

impl BatchReorganizer {
    pub fn new(store: Arc<dyn ObjectStore>, config: BatchConfig) -> Self {
        Self { store, config }
    }

    /// Copy then delete. A failed delete leaves a duplicate behind, never a
    /// missing object.
    async fn move_entry(&self, bucket: &BucketName, entry: &PlanEntry) -> StorageResult<()> {
        self.store
            .copy_object(bucket, &entry.source_key, None, &entry.destination_key)
            .await?;
        self.store.delete_object(bucket, &entry.source_key).await?;
        debug!(
            source = %entry.source_key,
            destination = %entry.destination_key,
            "object moved"
        );
        Ok(())
    }

    async fn content_type_of(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageResult<Option<Option<String>>> {
        match self.store.head_object(bucket, key).await {
            Ok(head) => Ok(Some(head.content_type)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ReorganizeService for BatchReorganizer {
    #[instrument(skip_all, fields(bucket = %bucket, rule = %rule))]
    async fn plan(
        &self,
        bucket: &BucketName,
        rule: ClassificationRule,
    ) -> StorageResult<ReorganizePlan> {
        let mut listing = object_listing(self.store.clone(), bucket.clone(), None);
        let mut listed = HashSet::new();
        let mut destinations: HashMap<ObjectKey, ObjectKey> = HashMap::new();
        let mut entries = Vec::new();

        while let Some(summary) = listing.try_next().await? {
            listed.insert(summary.key.clone());

            let content_type = if rule.needs_content_type() && summary.content_type.is_none() {
                match self.content_type_of(bucket, &summary.key).await? {
                    Some(content_type) => content_type,
                    None => {
                        debug!(key = %summary.key, "object vanished before head, skipping");
                        continue;
                    }
                }
            } else {
                summary.content_type
            };

            let folder = rule.classify(&summary.key, content_type.as_deref());
            if summary.key.is_under(&folder) {
                continue;
            }

            let destination = summary.key.nest_under(&folder)?;
            if let Some(other) = destinations.insert(destination.clone(), summary.key.clone()) {
                return Err(StorageError::invalid_input(format!(
                    "'{}' and '{}' would both move to '{}'",
                    other, summary.key, destination
                )));
            }

            entries.push(PlanEntry {
                source_key: summary.key,
                destination_key: destination,
            });
        }

        if let Some(entry) = entries
            .iter()
            .find(|entry| listed.contains(&entry.destination_key))
        {
            return Err(StorageError::invalid_input(format!(
                "moving '{}' would overwrite existing object '{}'",
                entry.source_key, entry.destination_key
            )));
        }

        info!(objects = listed.len(), moves = entries.len(), "plan computed");

        Ok(ReorganizePlan {
            bucket: bucket.clone(),
            rule,
            entries,
        })
    }

    #[instrument(skip_all, fields(bucket = %plan.bucket, entries = plan.len()))]
    async fn execute(&self, plan: &ReorganizePlan, cancel: CancellationToken) -> BatchResult {
        let concurrency = self.config.concurrency.max(1);

        let entries = plan.entries.clone().into_iter().enumerate();
        let mut outcomes: Vec<(usize, EntryOutcome)> = stream::iter(entries)
            .map(|(index, entry)| {
                let cancel = cancel.clone();
                let bucket = plan.bucket.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (index, EntryOutcome::Skipped);
                    }
                    match self.move_entry(&bucket, &entry).await {
                        Ok(()) => (index, EntryOutcome::Moved),
                        Err(err) => {
                            warn!(key = %entry.source_key, error = %err, "failed to move object");
                            (index, EntryOutcome::Failed(err))
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);

        let mut result = BatchResult::default();
        for (index, outcome) in outcomes {
            let key = plan.entries[index].source_key.clone();
            match outcome {
                EntryOutcome::Moved => result.succeeded.push(key),
                EntryOutcome::Failed(error) => result.failed.push(BatchFailure { key, error }),
                EntryOutcome::Skipped => result.skipped.push(key),
            }
        }

        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "reorganize finished"
        );
        result
    }
}
