//! Service-layer error types
//!
//! This module defines the broker error taxonomy and maps domain and
//! storage errors onto it.

use helm_broker_core::BrokerError;
use helm_broker_storage::{ErrorKind, StorageError};
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Service-layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Addon, plan, chart, instance or operation not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with an existing instance
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another kind of operation is running on the instance
    #[error("Operation in progress: {0}")]
    OperationInProgress(String),

    /// A collaborator is temporarily unavailable; the platform may retry
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The plan does not support binding
    #[error("Not bindable: {0}")]
    NotBindable(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rendering or resolving credentials failed
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// Internal service error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => ServiceError::NotFound(message),
            ErrorKind::AlreadyExists | ErrorKind::Conflict => ServiceError::Conflict(message),
            ErrorKind::Unavailable => ServiceError::Unavailable(message),
            ErrorKind::Invalid | ErrorKind::Internal => ServiceError::Internal(message),
        }
    }
}

impl From<BrokerError> for ServiceError {
    fn from(err: BrokerError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}
