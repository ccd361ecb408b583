//! All-or-nothing multi-key write batches.

use std::time::Duration;

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Write a string value.
    Set { key: String, value: String },
    /// Set a key's TTL (millisecond precision).
    Expire { key: String, ttl: Duration },
    /// Add a member to a set.
    SetAdd { key: String, member: String },
    /// Remove a member from a set.
    SetRemove { key: String, member: String },
    /// Delete a key.
    Delete { key: String },
}

impl WriteOp {
    /// The key this operation touches.
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. }
            | WriteOp::Expire { key, .. }
            | WriteOp::SetAdd { key, .. }
            | WriteOp::SetRemove { key, .. }
            | WriteOp::Delete { key } => key,
        }
    }
}

/// Ordered list of mutations applied as one transaction.
///
/// Either every operation becomes visible or none does. Operations are applied
/// in insertion order, so an `Expire` placed after a `Set` on the same key
/// applies to the freshly written value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string write.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Append a TTL change.
    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.ops.push(WriteOp::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    /// Append a set-membership addition.
    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Append a set-membership removal.
    pub fn set_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Append a key deletion.
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    /// Operations in application order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
