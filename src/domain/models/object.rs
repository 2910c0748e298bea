use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    errors::StorageError,
    value_objects::{BucketName, ObjectKey, VersionId},
};

/// One entry of an object listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSummary {
    pub key: ObjectKey,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: Option<String>,
    /// Only some stores report content types while listing
    pub content_type: Option<String>,
}

/// Metadata returned by a head request
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub version_id: Option<VersionId>,
}

/// Describes an object that a write made visible
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDescriptor {
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub size: u64,
    pub etag: Option<String>,
    pub version_id: Option<VersionId>,
}

/// Addresses one object, or one version of it, in a bulk delete
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    pub key: ObjectKey,
    pub version_id: Option<VersionId>,
}

impl ObjectIdentifier {
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            version_id: None,
        }
    }

    pub fn version(key: ObjectKey, version_id: VersionId) -> Self {
        Self {
            key,
            version_id: Some(version_id),
        }
    }
}

impl std::fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version_id {
            Some(version) => write!(f, "{}@{}", self.key, version),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Per-identifier outcome of a bulk delete request
#[derive(Debug, Clone, Default)]
pub struct BulkDeleteOutcome {
    pub deleted: Vec<ObjectIdentifier>,
    pub errors: Vec<(ObjectIdentifier, StorageError)>,
}

impl BulkDeleteOutcome {
    pub fn merge(&mut self, other: BulkDeleteOutcome) {
        self.deleted.extend(other.deleted);
        self.errors.extend(other.errors);
    }
}
