use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{errors::StorageError, value_objects::BucketName};

/// A bucket as reported by the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketInfo {
    pub name: BucketName,
    pub created_at: Option<DateTime<Utc>>,
}

/// Outcome of an operation over several buckets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketBatchResult {
    pub succeeded: Vec<BucketName>,
    pub failed: Vec<(BucketName, StorageError)>,
}

impl BucketBatchResult {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// IAM-style bucket policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Principal")]
    pub principal: serde_json::Value,
    #[serde(rename = "Action")]
    pub action: serde_json::Value,
    #[serde(rename = "Resource")]
    pub resource: serde_json::Value,
}

impl PolicyDocument {
    pub const VERSION: &'static str = "2012-10-17";

    /// Anyone may read any object of the bucket
    pub fn public_read(bucket: &BucketName) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            statements: vec![PolicyStatement {
                effect: "Allow".to_string(),
                principal: serde_json::Value::from("*"),
                action: serde_json::Value::from("s3:GetObject"),
                resource: serde_json::Value::from(format!("arn:aws:s3:::{}/*", bucket)),
            }],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_read_policy_document() {
        let bucket = BucketName::new("assets").unwrap();
        let json = PolicyDocument::public_read(&bucket).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["Version"], "2012-10-17");
        assert_eq!(value["Statement"][0]["Effect"], "Allow");
        assert_eq!(value["Statement"][0]["Principal"], "*");
        assert_eq!(value["Statement"][0]["Action"], "s3:GetObject");
        assert_eq!(value["Statement"][0]["Resource"], "arn:aws:s3:::assets/*");

        let parsed: PolicyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, PolicyDocument::public_read(&bucket));
    }
}
