//! Stable media and project identifiers

use crate::error::{Result, SpliceError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered media item.
///
/// Assigned by the registry at insert time and stable for the item's
/// lifetime, including across restarts (it is the durable index key).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    /// Create a new unique MediaId
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string (from the durable index or the CLI)
    pub fn from_raw<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaId({})", self.0)
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the project that scopes registry entries and storage.
///
/// Used as a directory name, so only ASCII alphanumerics, `-` and `_`
/// are accepted.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new<S: Into<String>>(id: S) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 128
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SpliceError::InvalidId(format!(
                "project id '{}' must be 1-128 characters of [A-Za-z0-9_-]",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectId {
    type Error = SpliceError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({})", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_id_generation() {
        let id1 = MediaId::new();
        let id2 = MediaId::new();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 36);
    }

    #[test]
    fn test_from_raw() {
        let id = MediaId::from_raw("abc");
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_project_id_accepts_directory_safe_names() {
        assert!(ProjectId::new("project_01-a").is_ok());
    }

    #[test]
    fn test_project_id_rejects_path_components() {
        assert!(ProjectId::new("../etc").is_err());
        assert!(ProjectId::new("a/b").is_err());
        assert!(ProjectId::new("").is_err());
    }

    #[test]
    fn test_project_id_deserialize_validates() {
        let ok: std::result::Result<ProjectId, _> = serde_json::from_str(r#""demo""#);
        assert!(ok.is_ok());
        let bad: std::result::Result<ProjectId, _> = serde_json::from_str(r#""de mo""#);
        assert!(bad.is_err());
    }
}
