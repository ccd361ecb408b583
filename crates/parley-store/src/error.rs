//! Error types for backing store operations.

use std::time::Duration;

/// Error type for backing store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// A command did not complete within the client timeout.
    #[error("Backing store command timed out after {0:?}")]
    Timeout(Duration),

    /// A batch was not applied as a whole.
    #[error("Backing store transaction failed: {0}")]
    Transaction(String),

    /// A stored value has the wrong type for the requested operation.
    #[error("Wrong value type: {0}")]
    WrongType(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        match e.kind() {
            redis::ErrorKind::TypeError => StoreError::WrongType(e.to_string()),
            redis::ErrorKind::ExecAbortError => StoreError::Transaction(e.to_string()),
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Result type for backing store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
