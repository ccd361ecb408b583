//! Error types for session store operations.

/// Error type for session store operations.
///
/// "Not found" is not an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backing store failed, timed out, aborted a transaction, or could
    /// not confirm a committed write. Safe to retry.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored session could not be encoded or decoded. Retrying will not help;
    /// the session should be invalidated.
    #[error("Session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::StoreUnavailable(_))
    }
}

impl From<parley_store::StoreError> for SessionError {
    fn from(e: parley_store::StoreError) -> Self {
        SessionError::StoreUnavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::StoreUnavailable(format!("document store: {}", e))
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, SessionError>;
