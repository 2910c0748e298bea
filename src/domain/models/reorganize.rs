use serde::Serialize;

use crate::domain::{
    errors::{StorageError, ValidationError},
    value_objects::{BucketName, ObjectKey},
};

/// Folder for objects a rule cannot classify
pub const UNCLASSIFIED: &str = "unclassified";

/// Maps an object to the folder it belongs in.
///
/// Rules are total and deterministic: the same key and content type always
/// produce the same folder, and every object gets one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationRule {
    /// Folder is the text after the last `.` of the file name
    ByExtension,
    /// Folder is the primary MIME type, e.g. `image` for `image/png`
    ByContentType,
}

impl ClassificationRule {
    pub fn classify(&self, key: &ObjectKey, content_type: Option<&str>) -> String {
        let folder = match self {
            ClassificationRule::ByExtension => key.extension().map(str::to_string),
            ClassificationRule::ByContentType => content_type.and_then(primary_type),
        };
        folder.unwrap_or_else(|| UNCLASSIFIED.to_string())
    }

    /// Whether classification reads the object's content type
    pub fn needs_content_type(&self) -> bool {
        matches!(self, ClassificationRule::ByContentType)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationRule::ByExtension => "extension",
            ClassificationRule::ByContentType => "content-type",
        }
    }
}

impl std::str::FromStr for ClassificationRule {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extension" | "ext" => Ok(ClassificationRule::ByExtension),
            "content-type" | "type" | "mime" => Ok(ClassificationRule::ByContentType),
            _ => Err(ValidationError::InvalidField {
                field: "rule".to_string(),
                value: s.to_string(),
                expected: "extension or content-type".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ClassificationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn primary_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or_default();
    let (primary, _) = essence.split_once('/')?;
    let primary = primary.trim().to_ascii_lowercase();
    (!primary.is_empty()).then_some(primary)
}

/// One move of a reorganization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub source_key: ObjectKey,
    pub destination_key: ObjectKey,
}

/// Moves computed before anything is mutated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorganizePlan {
    pub bucket: BucketName,
    pub rule: ClassificationRule,
    pub entries: Vec<PlanEntry>,
}

impl ReorganizePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub key: ObjectKey,
    pub error: StorageError,
}

/// Outcome of a batch; every item lands in exactly one list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub succeeded: Vec<ObjectKey>,
    pub failed: Vec<BatchFailure>,
    /// Never started because the batch was cancelled
    pub skipped: Vec<ObjectKey>,
}

impl BatchResult {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        !self.skipped.is_empty()
    }
}
