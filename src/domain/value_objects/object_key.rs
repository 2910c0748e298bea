use crate::domain::errors::ValidationError;

/// A validated object key (path) within a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new ObjectKey with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::EmptyObjectKey);
        }

        if value.len() > 1024 {
            return Err(ValidationError::ObjectKeyTooLong {
                actual: value.len(),
                max: 1024,
            });
        }

        if value.contains('\0') {
            return Err(ValidationError::InvalidObjectKeyCharacter('\0'));
        }

        if value.starts_with('/') {
            return Err(ValidationError::ObjectKeyStartsWithSlash);
        }

        if value.contains("//") {
            return Err(ValidationError::ObjectKeyContainsDoubleSlash);
        }

        Ok(Self(value))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the directory part of the key (everything before the last '/')
    pub fn parent(&self) -> Option<&str> {
        self.0.rfind('/').map(|idx| &self.0[..idx])
    }

    /// Get the file name part of the key (everything after the last '/')
    pub fn file_name(&self) -> &str {
        self.0.rfind('/').map_or(&self.0, |idx| &self.0[idx + 1..])
    }

    /// Text after the last '.' of the file name, if any
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.')
            .map(|idx| &name[idx + 1..])
            .filter(|ext| !ext.is_empty())
    }

    /// Whether the key lives under `folder/`
    pub fn is_under(&self, folder: &str) -> bool {
        self.0
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Prefix this key with a folder: `folder/<key>`
    pub fn nest_under(&self, folder: &str) -> Result<ObjectKey, ValidationError> {
        let folder = folder.trim_end_matches('/');
        ObjectKey::new(format!("{}/{}", folder, self.0))
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_object_key() {
        assert!(ObjectKey::new("file.txt").is_ok());
        assert!(ObjectKey::new("folder/file.txt").is_ok());
        assert!(ObjectKey::new("deep/folder/structure/file.txt").is_ok());
    }

    #[test]
    fn test_invalid_object_key() {
        assert!(ObjectKey::new("").is_err());
        assert!(ObjectKey::new("/leading-slash").is_err());
        assert!(ObjectKey::new("double//slash").is_err());
        assert!(ObjectKey::new("null\0byte").is_err());
        assert!(ObjectKey::new("x".repeat(1025)).is_err());
    }

    #[test]
    fn test_object_key_parts() {
        let key = ObjectKey::new("folder/subfolder/file.txt").unwrap();
        assert_eq!(key.parent(), Some("folder/subfolder"));
        assert_eq!(key.file_name(), "file.txt");

        let root_key = ObjectKey::new("file.txt").unwrap();
        assert_eq!(root_key.parent(), None);
        assert_eq!(root_key.file_name(), "file.txt");
    }

    #[test]
    fn test_extension_uses_last_dot_of_file_name() {
        assert_eq!(ObjectKey::new("a.b.tar.gz").unwrap().extension(), Some("gz"));
        assert_eq!(ObjectKey::new("README").unwrap().extension(), None);
        assert_eq!(ObjectKey::new("release.v2/README").unwrap().extension(), None);
        assert_eq!(ObjectKey::new("trailing.").unwrap().extension(), None);
    }

    #[test]
    fn test_folder_helpers() {
        let key = ObjectKey::new("image/photo.png").unwrap();
        assert!(key.is_under("image"));
        assert!(!key.is_under("imag"));
        assert!(!ObjectKey::new("image").unwrap().is_under("image"));

        let nested = ObjectKey::new("docs/a.txt").unwrap().nest_under("txt").unwrap();
        assert_eq!(nested.as_str(), "txt/docs/a.txt");
    }
}
