use crate::domain::errors::ValidationError;

/// An opaque identifier for an object version, as issued by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct VersionId(String);

impl VersionId {
    /// Version id S3 reports for objects written while versioning was off
    pub const NULL: &'static str = "null";

    /// Create a new VersionId with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::EmptyVersionId);
        }

        if value.len() > 1024 {
            return Err(ValidationError::VersionIdTooLong {
                actual: value.len(),
                max: 1024,
            });
        }

        // Store-issued ids are opaque; only reject characters that can never
        // survive a query string round trip.
        if let Some(c) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidVersionIdCharacter(c));
        }

        Ok(Self(value))
    }

    /// Generate a new unique version ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The `null` version of an unversioned object
    pub fn null() -> Self {
        Self(Self::NULL.to_string())
    }

    /// Get the version ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == Self::NULL
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VersionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_version_id() {
        assert!(VersionId::new("v1.0.0").is_ok());
        assert!(VersionId::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(VersionId::new("3HL4kqtJlcpXroDTDmJ+rmSpXd3dIbrHY").is_ok());
        assert!(VersionId::null().is_null());
    }

    #[test]
    fn test_invalid_version_id() {
        assert!(VersionId::new("").is_err());
        assert!(VersionId::new("version with spaces").is_err());
        assert!(VersionId::new("tab\tseparated").is_err());
        assert!(VersionId::new("x".repeat(1025)).is_err());
    }

    #[test]
    fn test_generate_version_id() {
        let v1 = VersionId::generate();
        let v2 = VersionId::generate();

        assert_ne!(v1, v2);
        assert!(VersionId::new(v1.as_str()).is_ok());
    }
}
