//! Storage collaborator
//!
//! The key-value engine and its transaction protocol live outside this
//! crate. Admission control only needs two calls from it:
//!
//! - `apply_data_change`: apply one shard's part of an admitted batch
//! - `wipe`: drop every triple a shard holds (drop-all)
//!
//! `MemoryStorage` is the in-process engine used by tests and the CLI.

mod errors;
mod memory;

pub use errors::{StorageError, StorageResult};
pub use memory::MemoryStorage;

use crate::membership::ShardId;
use crate::mutation::Triple;

/// Storage engine shared by the replicas of a cluster.
///
/// Each call is atomic per shard: a failed batch leaves no partial writes.
pub trait StorageEngine: Send + Sync {
    /// Deletes every triple matching `delete`, then stores `set`.
    /// Returns the number of triples written.
    fn apply_data_change(
        &self,
        shard: ShardId,
        set: &[Triple],
        delete: &[Triple],
    ) -> StorageResult<usize>;

    /// Removes all data held by `shard`. Returns the number of triples removed.
    fn wipe(&self, shard: ShardId) -> StorageResult<usize>;
}
