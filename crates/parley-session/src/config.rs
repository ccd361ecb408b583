//! Configuration for the session store.

use std::path::PathBuf;
use std::time::Duration;

/// Default wait before the single post-commit re-read.
pub const DEFAULT_VERIFY_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Which backend holds session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Shared key-value store with a user index and TTLs.
    #[default]
    Distributed,
    /// Queryable document table.
    Document,
}

/// How far reads can lag behind a committed batch in the backing store.
///
/// This decides what `save` does to confirm its own write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConsistency {
    /// Reads may briefly miss a committed write: read, wait `retry_delay`,
    /// read exactly once more.
    Eventual { retry_delay: Duration },
    /// Reads always observe committed writes: one unconditional read.
    Linearizable,
}

impl Default for ReadConsistency {
    fn default() -> Self {
        ReadConsistency::Eventual {
            retry_delay: DEFAULT_VERIFY_RETRY_DELAY,
        }
    }
}

/// Configuration for opening a session store.
#[derive(Debug, Clone, Default)]
pub struct SessionStoreConfig {
    /// Backend to open.
    pub backend: BackendKind,

    /// Post-commit visibility handling for the distributed backend.
    pub consistency: ReadConsistency,

    /// SQLite file for the document backend. `None` keeps the table in memory.
    pub document_path: Option<PathBuf>,
}

impl SessionStoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the read consistency of the backing store.
    pub fn with_consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the document database file.
    pub fn with_document_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.document_path = Some(path.into());
        self
    }
}
