//! Consensus seam
//!
//! Admission control is built on top of a primitive that can commit an
//! ordered, linearizable sequence of configuration changes. Leader election
//! and log replication live behind this trait; `MemoryLog` is the
//! in-process implementation used by tests and the CLI.
//!
//! Contract:
//! - `propose_and_commit` returns only once the entry has a committed index
//! - every subscriber receives every committed entry, in index order
//! - `committed_index` is the latest index any subscriber may be asked to apply

mod entry;
mod errors;
mod memory;

pub use entry::{CommittedEntry, LogEntry, LogIndex};
pub use errors::{ConsensusError, ConsensusResult};
pub use memory::MemoryLog;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Stream of committed entries delivered to one replica
pub type LogSubscription = mpsc::UnboundedReceiver<CommittedEntry>;

/// Ordered commit primitive shared by every replica of the cluster.
#[async_trait]
pub trait Consensus: Send + Sync {
    /// Submit an entry and wait until it is committed.
    async fn propose_and_commit(&self, entry: LogEntry) -> ConsensusResult<LogIndex>;

    /// Latest committed index (read-latest-committed-state).
    fn committed_index(&self) -> LogIndex;

    /// Subscribe to committed entries, starting from the first one.
    fn subscribe(&self) -> LogSubscription;
}
