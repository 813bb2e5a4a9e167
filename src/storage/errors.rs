//! Storage collaborator errors

use thiserror::Error;

use crate::membership::ShardId;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Write could not be applied; nothing from the batch is visible
    #[error("write to {shard} failed: {reason}")]
    WriteFailed { shard: ShardId, reason: String },

    #[error("wipe of {shard} failed: {reason}")]
    WipeFailed { shard: ShardId, reason: String },
}

impl StorageError {
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::WriteFailed { .. } => "STORAGE_WRITE_FAILED",
            StorageError::WipeFailed { .. } => "STORAGE_WIPE_FAILED",
        }
    }
}
