//! Error types for the broker domain model

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors raised while building or validating domain values
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Identifier is empty or malformed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Chart values are not a JSON object
    #[error("Invalid chart values: {0}")]
    InvalidValues(String),

    /// Addon definition is inconsistent
    #[error("Invalid addon: {0}")]
    InvalidAddon(String),

    /// Invalid version format
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

impl From<semver::Error> for BrokerError {
    fn from(err: semver::Error) -> Self {
        BrokerError::InvalidVersion(err.to_string())
    }
}
