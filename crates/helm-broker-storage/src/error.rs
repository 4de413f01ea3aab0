//! Storage error types
//!
//! Every storage failure carries an explicit [`ErrorKind`]. Callers branch
//! on the kind (most importantly "not found" and "already exists") instead
//! of inspecting messages.

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Classification of a storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested record does not exist
    NotFound,
    /// A record with the same key already exists
    AlreadyExists,
    /// The write conflicts with the current state of the record
    Conflict,
    /// The backend cannot be reached; the caller may retry
    Unavailable,
    /// The record is malformed
    Invalid,
    /// Any other backend failure
    Internal,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Write rejected by the current record state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend unreachable
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Malformed record
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Domain error from core crate
    #[error("Domain error: {0}")]
    Domain(#[from] helm_broker_core::BrokerError),

    /// Internal storage error
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StorageError::Conflict(_) => ErrorKind::Conflict,
            StorageError::Unavailable(_) => ErrorKind::Unavailable,
            StorageError::InvalidData(_) | StorageError::Domain(_) => ErrorKind::Invalid,
            StorageError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error is a duplicate/already exists error
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Check if this is a transient error that could be retried
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidData(format!("{}", err))
    }
}

/// Extension for results where a missing record is an acceptable outcome
pub trait OptionalExt<T> {
    /// Map a not-found error to `Ok(None)`
    fn optional(self) -> StorageResult<Option<T>>;
}

impl<T> OptionalExt<T> for StorageResult<T> {
    fn optional(self) -> StorageResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = StorageError::NotFound("test".to_string());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_already_exists());

        let exists = StorageError::AlreadyExists("test".to_string());
        assert_eq!(exists.kind(), ErrorKind::AlreadyExists);

        let unavailable = StorageError::Unavailable("test".to_string());
        assert!(unavailable.is_transient());

        let conflict = StorageError::Conflict("test".to_string());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound("instance i-1".to_string());
        assert_eq!(err.to_string(), "Not found: instance i-1");
    }

    #[test]
    fn test_optional_maps_only_not_found() {
        let missing: StorageResult<u8> = Err(StorageError::NotFound("x".to_string()));
        assert!(missing.optional().unwrap().is_none());

        let failed: StorageResult<u8> = Err(StorageError::Unavailable("x".to_string()));
        assert!(failed.optional().is_err());

        let found: StorageResult<u8> = Ok(7);
        assert_eq!(found.optional().unwrap(), Some(7));
    }
}
