//! Error types for Splice

use std::io;
use thiserror::Error;

/// The main error type for Splice operations
#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Acquisition error: {0}")]
    AcquisitionError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageFailure),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    #[error("JSON error: {0}")]
    JsonError(String),
}

/// Result type alias for Splice operations
pub type Result<T> = std::result::Result<T, SpliceError>;

impl From<toml::de::Error> for SpliceError {
    fn from(err: toml::de::Error) -> Self {
        SpliceError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for SpliceError {
    fn from(err: toml::ser::Error) -> Self {
        SpliceError::TomlSerError(err.to_string())
    }
}

impl From<serde_json::Error> for SpliceError {
    fn from(err: serde_json::Error) -> Self {
        SpliceError::JsonError(err.to_string())
    }
}

/// Why a durable file write failed.
///
/// Each variant maps to a distinct user-facing message; callers must not
/// collapse them into a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageFailure {
    #[error("not enough disk space to save the file")]
    InsufficientSpace,

    #[error("permission denied while saving the file")]
    PermissionDenied,

    #[error("could not save the file: {0}")]
    Unknown(String),
}

impl StorageFailure {
    /// Short machine-readable reason: `space`, `permission` or `unknown`
    pub fn reason(&self) -> &'static str {
        match self {
            StorageFailure::InsufficientSpace => "space",
            StorageFailure::PermissionDenied => "permission",
            StorageFailure::Unknown(_) => "unknown",
        }
    }

    /// Classify an IO error raised while creating directories or writing files
    pub fn from_io(err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            return StorageFailure::PermissionDenied;
        }
        match err.raw_os_error() {
            Some(code) if is_no_space_code(code) => StorageFailure::InsufficientSpace,
            Some(code) if is_permission_code(code) => StorageFailure::PermissionDenied,
            _ => StorageFailure::Unknown(err.to_string()),
        }
    }
}

#[cfg(unix)]
fn is_no_space_code(code: i32) -> bool {
    // ENOSPC, EDQUOT (linux), EDQUOT (bsd/macos)
    matches!(code, 28 | 122 | 69)
}

#[cfg(windows)]
fn is_no_space_code(code: i32) -> bool {
    // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
    matches!(code, 39 | 112)
}

#[cfg(not(any(unix, windows)))]
fn is_no_space_code(_code: i32) -> bool {
    false
}

#[cfg(unix)]
fn is_permission_code(code: i32) -> bool {
    // EPERM, EACCES, EROFS
    matches!(code, 1 | 13 | 30)
}

#[cfg(windows)]
fn is_permission_code(code: i32) -> bool {
    // ERROR_ACCESS_DENIED, ERROR_WRITE_PROTECT
    matches!(code, 5 | 19)
}

#[cfg(not(any(unix, windows)))]
fn is_permission_code(_code: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_kind_is_classified() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let failure = StorageFailure::from_io(&err);
        assert_eq!(failure, StorageFailure::PermissionDenied);
        assert_eq!(failure.reason(), "permission");
    }

    #[cfg(unix)]
    #[test]
    fn test_no_space_code_is_classified() {
        let err = io::Error::from_raw_os_error(28);
        assert_eq!(StorageFailure::from_io(&err), StorageFailure::InsufficientSpace);
        assert_eq!(StorageFailure::from_io(&err).reason(), "space");
    }

    #[test]
    fn test_other_errors_are_unknown() {
        let err = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let failure = StorageFailure::from_io(&err);
        assert_eq!(failure.reason(), "unknown");
        assert!(failure.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_storage_failure_converts_into_splice_error() {
        let err: SpliceError = StorageFailure::InsufficientSpace.into();
        assert!(matches!(err, SpliceError::StorageError(StorageFailure::InsufficientSpace)));
    }
}
