use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Subcommand, ValueEnum};
use s3_housekeeper::{
    ports::{ImportRequest, ProgressCallback},
    AppConfig, AppServices, BucketName, ClassificationRule, ObjectKey, UploadRequest, VersionId,
    VersionSelector,
};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::report;

const MIB: u64 = 1024 * 1024;

/// How a command ended, beyond success or error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A batch finished but some items failed or were skipped
    PartialFailure,
}

impl Outcome {
    fn from_success(complete: bool) -> Self {
        if complete {
            Outcome::Success
        } else {
            Outcome::PartialFailure
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage buckets
    Bucket {
        #[command(subcommand)]
        command: BucketCommand,
    },

    /// Manage bucket policies and object ACLs
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// Everyday object operations
    Object {
        #[command(subcommand)]
        command: ObjectCommand,
    },

    /// Upload a file in parts
    Upload {
        bucket: BucketName,
        key: ObjectKey,
        /// File path to upload
        file: PathBuf,
        /// Part size in MiB
        #[arg(long)]
        part_size_mib: Option<u64>,
        /// Parts uploaded at once
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Move objects into folders named by extension or content type
    Reorganize {
        bucket: BucketName,
        /// Classification rule: extension or content-type
        #[arg(long)]
        by: ClassificationRule,
        /// Print the plan without moving anything
        #[arg(long)]
        dry_run: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
        /// Objects moved at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Manage object versions
    Version {
        #[command(subcommand)]
        command: VersionCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum BucketCommand {
    /// List buckets
    List,

    /// Create a bucket
    Create {
        name: BucketName,
        #[arg(long)]
        region: Option<String>,
    },

    /// Create buckets <base>-<first> through <base>-<last>
    CreateRange {
        base: String,
        first: u32,
        last: u32,
        #[arg(long)]
        region: Option<String>,
    },

    /// Delete an empty bucket
    Delete { name: BucketName },

    /// Delete every empty bucket
    DeleteAll {
        /// Confirm deleting all buckets
        #[arg(long)]
        yes: bool,
    },

    /// Check whether a bucket exists
    Exists { name: BucketName },

    /// Turn versioning on or off
    Versioning { name: BucketName, state: Toggle },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Print the public-read policy for a bucket
    Generate { bucket: BucketName },

    /// Attach the public-read policy to a bucket
    Apply { bucket: BucketName },

    /// Print a bucket's policy
    Show { bucket: BucketName },

    /// Grant public read on one object
    PublicObject { bucket: BucketName, key: ObjectKey },
}

#[derive(Subcommand, Debug)]
pub enum ObjectCommand {
    /// List objects
    List {
        bucket: BucketName,
        /// Prefix to filter objects
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Upload a small object in one request
    Put {
        bucket: BucketName,
        key: ObjectKey,
        /// File path to upload
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download an object
    Get {
        bucket: BucketName,
        key: ObjectKey,
        /// A specific version
        #[arg(long)]
        version: Option<VersionId>,
        /// Output file path, stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete an object
    Delete { bucket: BucketName, key: ObjectKey },

    /// Download an image or mp4 from a URL into the bucket
    Import {
        bucket: BucketName,
        key: ObjectKey,
        url: String,
        /// Also keep the downloaded file here
        #[arg(long)]
        keep_local: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum VersionCommand {
    /// List versions of an object
    List { bucket: BucketName, key: ObjectKey },

    /// Delete versions older than a number of days
    Prune {
        bucket: BucketName,
        key: ObjectKey,
        #[arg(long)]
        older_than_days: u32,
    },

    /// Make an older version the latest again
    Restore {
        bucket: BucketName,
        key: ObjectKey,
        /// A version id, "earliest" or "previous"
        selector: VersionSelector,
    },
}

impl Command {
    /// Apply per-command overrides to the configuration
    pub fn tune(&self, config: &mut AppConfig) {
        match self {
            Command::Upload {
                part_size_mib,
                concurrency,
                ..
            } => {
                if let Some(mib) = part_size_mib {
                    config.multipart.default_part_size = mib.saturating_mul(MIB);
                }
                if let Some(concurrency) = concurrency {
                    config.multipart.concurrency = *concurrency;
                }
            }
            Command::Reorganize {
                concurrency: Some(concurrency),
                ..
            } => config.batch.concurrency = *concurrency,
            _ => {}
        }
    }

    pub async fn run(&self, app: &AppServices, cancel: CancellationToken) -> Result<Outcome> {
        match self {
            Command::Bucket { command } => command.run(app).await,
            Command::Policy { command } => command.run(app).await,
            Command::Object { command } => command.run(app).await,
            Command::Upload {
                bucket,
                key,
                file,
                content_type,
                ..
            } => upload(app, bucket, key, file, content_type.as_deref(), cancel).await,
            Command::Reorganize {
                bucket,
                by,
                dry_run,
                json,
                ..
            } => reorganize(app, bucket, *by, *dry_run, *json, cancel).await,
            Command::Version { command } => command.run(app, cancel).await,
        }
    }
}

async fn upload(
    app: &AppServices,
    bucket: &BucketName,
    key: &ObjectKey,
    file: &Path,
    content_type: Option<&str>,
    cancel: CancellationToken,
) -> Result<Outcome> {
    let handle = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let total_bytes = handle.metadata().await?.len();

    let mut request = UploadRequest::new(
        bucket.clone(),
        key.clone(),
        app.config.multipart.default_part_size,
    )
    .with_total_bytes(total_bytes);
    if let Some(content_type) = content_type {
        request = request.with_content_type(content_type);
    }

    let progress: ProgressCallback = Arc::new(report::progress);
    let object = app
        .uploads
        .upload(request, Box::new(handle), Some(progress), cancel)
        .await
        .with_context(|| format!("Failed to upload {} to {}/{}", file.display(), bucket, key))?;

    report::uploaded(&object);
    Ok(Outcome::Success)
}

async fn reorganize(
    app: &AppServices,
    bucket: &BucketName,
    rule: ClassificationRule,
    dry_run: bool,
    json: bool,
    cancel: CancellationToken,
) -> Result<Outcome> {
    let plan = app
        .reorganizer
        .plan(bucket, rule)
        .await
        .with_context(|| format!("Failed to plan reorganizing {}", bucket))?;

    if dry_run || plan.is_empty() {
        report::plan(&plan, json)?;
        return Ok(Outcome::Success);
    }

    info!(%bucket, moves = plan.len(), "executing plan");
    let result = app.reorganizer.execute(&plan, cancel).await;
    report::batch(&result, json)?;
    Ok(Outcome::from_success(result.is_complete_success()))
}

impl BucketCommand {
    async fn run(&self, app: &AppServices) -> Result<Outcome> {
        match self {
            BucketCommand::List => {
                let buckets = app.buckets.list_buckets().await?;
                report::buckets(&buckets);
            }
            BucketCommand::Create { name, region } => {
                app.buckets
                    .create_bucket(name, region.as_deref())
                    .await
                    .with_context(|| format!("Failed to create bucket {}", name))?;
                println!("created {}", name);
            }
            BucketCommand::CreateRange {
                base,
                first,
                last,
                region,
            } => {
                let result = app
                    .buckets
                    .create_bucket_range(base, *first, *last, region.as_deref())
                    .await?;
                report::bucket_batch("created", &result);
                return Ok(Outcome::from_success(result.is_complete_success()));
            }
            BucketCommand::Delete { name } => {
                app.buckets
                    .delete_bucket(name)
                    .await
                    .with_context(|| format!("Failed to delete bucket {}", name))?;
                println!("deleted {}", name);
            }
            BucketCommand::DeleteAll { yes } => {
                if !yes {
                    bail!("refusing to delete every bucket without --yes");
                }
                let result = app.buckets.delete_all_buckets().await?;
                report::bucket_batch("deleted", &result);
                return Ok(Outcome::from_success(result.is_complete_success()));
            }
            BucketCommand::Exists { name } => {
                let exists = app.buckets.bucket_exists(name).await?;
                println!("{}", if exists { "yes" } else { "no" });
            }
            BucketCommand::Versioning { name, state } => {
                let enabled = *state == Toggle::On;
                app.buckets
                    .set_versioning(name, enabled)
                    .await
                    .with_context(|| format!("Failed to change versioning of {}", name))?;
                println!(
                    "versioning {} for {}",
                    if enabled { "enabled" } else { "suspended" },
                    name
                );
            }
        }
        Ok(Outcome::Success)
    }
}

impl PolicyCommand {
    async fn run(&self, app: &AppServices) -> Result<Outcome> {
        match self {
            PolicyCommand::Generate { bucket } => {
                println!("{}", app.buckets.public_read_policy(bucket).to_json()?);
            }
            PolicyCommand::Apply { bucket } => {
                let policy = app
                    .buckets
                    .apply_public_read_policy(bucket)
                    .await
                    .with_context(|| format!("Failed to apply policy to {}", bucket))?;
                println!("{}", policy.to_json()?);
            }
            PolicyCommand::Show { bucket } => {
                println!("{}", app.buckets.get_bucket_policy(bucket).await?);
            }
            PolicyCommand::PublicObject { bucket, key } => {
                app.buckets
                    .make_object_public(bucket, key)
                    .await
                    .with_context(|| format!("Failed to make {}/{} public", bucket, key))?;
                println!("{}/{} is public", bucket, key);
            }
        }
        Ok(Outcome::Success)
    }
}

impl ObjectCommand {
    async fn run(&self, app: &AppServices) -> Result<Outcome> {
        match self {
            ObjectCommand::List { bucket, prefix } => {
                let objects = app.objects.list_objects(bucket, prefix.as_deref()).await?;
                report::objects(&objects);
            }
            ObjectCommand::Put {
                bucket,
                key,
                file,
                content_type,
            } => {
                let data = tokio::fs::read(file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let object = app
                    .objects
                    .put_object(bucket, key, Bytes::from(data), content_type.as_deref())
                    .await?;
                report::uploaded(&object);
            }
            ObjectCommand::Get {
                bucket,
                key,
                version,
                output,
            } => {
                let data = app
                    .objects
                    .get_object(bucket, key, version.as_ref())
                    .await
                    .with_context(|| format!("Failed to get {}/{}", bucket, key))?;
                match output {
                    Some(path) => tokio::fs::write(path, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?,
                    None => {
                        let mut stdout = tokio::io::stdout();
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                }
            }
            ObjectCommand::Delete { bucket, key } => {
                app.objects.delete_object(bucket, key).await?;
                println!("deleted {}/{}", bucket, key);
            }
            ObjectCommand::Import {
                bucket,
                key,
                url,
                keep_local,
            } => {
                let imported = app
                    .objects
                    .import_from_url(ImportRequest {
                        bucket: bucket.clone(),
                        key: key.clone(),
                        url: url.clone(),
                        keep_local: keep_local.clone(),
                    })
                    .await
                    .with_context(|| format!("Failed to import {}", url))?;
                println!("{} ({})", imported.url, imported.content_type);
            }
        }
        Ok(Outcome::Success)
    }
}

impl VersionCommand {
    async fn run(&self, app: &AppServices, cancel: CancellationToken) -> Result<Outcome> {
        match self {
            VersionCommand::List { bucket, key } => {
                let history = app.versions.list_versions(bucket, key).await?;
                report::versions(&history);
                Ok(Outcome::Success)
            }
            VersionCommand::Prune {
                bucket,
                key,
                older_than_days,
            } => {
                let max_age = chrono::Duration::days(i64::from(*older_than_days));
                let pruned = app
                    .versions
                    .prune_older_than(bucket, key, max_age, cancel)
                    .await
                    .with_context(|| format!("Failed to prune {}/{}", bucket, key))?;
                report::prune(&pruned);
                Ok(Outcome::from_success(pruned.is_complete_success()))
            }
            VersionCommand::Restore {
                bucket,
                key,
                selector,
            } => {
                let version = app
                    .versions
                    .restore_version(bucket, key, selector)
                    .await
                    .with_context(|| format!("Failed to restore {}/{} to {}", bucket, key, selector))?;
                println!("restored {}/{}; latest version is now {}", bucket, key, version);
                Ok(Outcome::Success)
            }
        }
    }
}
