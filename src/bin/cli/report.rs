//! Human and JSON output of command results

use std::io::Write;

use anyhow::Result;
use s3_housekeeper::{
    domain::{BucketInfo, ObjectSummary},
    BatchResult, BucketBatchResult, ObjectDescriptor, PruneReport, ReorganizePlan,
    UploadProgress, VersionHistory,
};
use serde_json::json;

pub fn progress(progress: UploadProgress) {
    let mut stderr = std::io::stderr();
    let _ = match progress.total_bytes {
        Some(total) => write!(
            stderr,
            "\r{} / {} bytes, {} parts",
            progress.bytes_uploaded, total, progress.parts_committed
        ),
        None => write!(
            stderr,
            "\r{} bytes, {} parts",
            progress.bytes_uploaded, progress.parts_committed
        ),
    };
    let _ = stderr.flush();
}

pub fn uploaded(object: &ObjectDescriptor) {
    eprintln!();
    match &object.version_id {
        Some(version) => println!(
            "stored {}/{} ({} bytes, version {})",
            object.bucket, object.key, object.size, version
        ),
        None => println!("stored {}/{} ({} bytes)", object.bucket, object.key, object.size),
    }
}

pub fn buckets(buckets: &[BucketInfo]) {
    for bucket in buckets {
        match bucket.created_at {
            Some(created) => println!("{}\t{}", created.to_rfc3339(), bucket.name),
            None => println!("-\t{}", bucket.name),
        }
    }
}

pub fn bucket_batch(verb: &str, result: &BucketBatchResult) {
    for name in &result.succeeded {
        println!("{} {}", verb, name);
    }
    for (name, error) in &result.failed {
        println!("FAILED {}: {}", name, error);
    }
    println!(
        "{} succeeded, {} failed",
        result.succeeded.len(),
        result.failed.len()
    );
}

pub fn objects(objects: &[ObjectSummary]) {
    for object in objects {
        println!(
            "{}\t{:>12}\t{}",
            object.last_modified.to_rfc3339(),
            object.size,
            object.key
        );
    }
}

pub fn plan(plan: &ReorganizePlan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    if plan.is_empty() {
        println!("{} is already organized by {}", plan.bucket, plan.rule);
        return Ok(());
    }
    for entry in &plan.entries {
        println!("{} -> {}", entry.source_key, entry.destination_key);
    }
    println!("{} objects to move", plan.len());
    Ok(())
}

pub fn batch(result: &BatchResult, json: bool) -> Result<()> {
    if json {
        let failed: Vec<_> = result
            .failed
            .iter()
            .map(|failure| {
                json!({
                    "key": failure.key,
                    "code": failure.error.code(),
                    "message": failure.error.to_string(),
                })
            })
            .collect();
        let summary = json!({
            "succeeded": result.succeeded,
            "failed": failed,
            "skipped": result.skipped,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for key in &result.succeeded {
        println!("moved {}", key);
    }
    for failure in &result.failed {
        println!("FAILED {}: {}", failure.key, failure.error);
    }
    for key in &result.skipped {
        println!("skipped {}", key);
    }
    println!(
        "{} moved, {} failed, {} skipped",
        result.succeeded.len(),
        result.failed.len(),
        result.skipped.len()
    );
    Ok(())
}

pub fn versions(history: &VersionHistory) {
    for version in history.versions() {
        let mut flags = Vec::new();
        if version.is_latest {
            flags.push("latest");
        }
        if version.is_delete_marker {
            flags.push("delete-marker");
        }
        println!(
            "{}\t{}\t{:>12}\t{}",
            version.last_modified.to_rfc3339(),
            version.version_id,
            version.size,
            flags.join(",")
        );
    }
}

pub fn prune(report: &PruneReport) {
    for version in &report.deleted {
        println!("deleted {}@{}", report.key, version);
    }
    for (version, error) in &report.failed {
        println!("FAILED {}@{}: {}", report.key, version, error);
    }
    println!(
        "{} versions older than {} deleted, {} failed{}",
        report.count(),
        report.cutoff.to_rfc3339(),
        report.failed.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
}
