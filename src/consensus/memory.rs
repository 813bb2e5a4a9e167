//! In-memory ordered log
//!
//! Commits are totally ordered by a single mutex; delivery to subscribers
//! happens under the same lock so every replica sees the same sequence.
//!
//! Fault injection:
//! - `set_available(false)` simulates loss of quorum
//! - `pause_delivery()` commits entries without delivering them, which
//!   leaves proposers waiting for a local apply that has not happened yet

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::entry::{CommittedEntry, LogEntry, LogIndex};
use super::errors::{ConsensusError, ConsensusResult};
use super::{Consensus, LogSubscription};

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<LogEntry>,
    /// Number of entries handed to subscribers
    delivered: usize,
    subscribers: Vec<mpsc::UnboundedSender<CommittedEntry>>,
    unavailable: bool,
    paused: bool,
}

impl LogInner {
    fn committed(&self, position: usize) -> CommittedEntry {
        CommittedEntry {
            index: LogIndex::new(position as u64 + 1),
            entry: self.entries[position].clone(),
        }
    }

    fn deliver_pending(&mut self) {
        while self.delivered < self.entries.len() {
            let committed = self.committed(self.delivered);
            // Dropped receivers belong to stopped replicas.
            self.subscribers
                .retain(|subscriber| subscriber.send(committed.clone()).is_ok());
            self.delivered += 1;
        }
    }
}

/// Single-process consensus log.
#[derive(Debug, Default)]
pub struct MemoryLog {
    inner: Mutex<LogInner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Toggle quorum availability. Proposals fail while unavailable.
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Keep committing entries but stop handing them to replicas.
    pub fn pause_delivery(&self) {
        self.lock().paused = true;
    }

    /// Deliver everything committed while paused, in order.
    pub fn resume_delivery(&self) {
        let mut inner = self.lock();
        inner.paused = false;
        inner.deliver_pending();
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every committed entry with its index
    pub fn entries(&self) -> Vec<CommittedEntry> {
        let inner = self.lock();
        (0..inner.entries.len()).map(|pos| inner.committed(pos)).collect()
    }

    fn append(&self, entry: LogEntry) -> ConsensusResult<LogIndex> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(ConsensusError::Unavailable("no quorum".into()));
        }
        inner.entries.push(entry);
        let index = LogIndex::new(inner.entries.len() as u64);
        if !inner.paused {
            inner.deliver_pending();
        }
        Ok(index)
    }
}

#[async_trait]
impl Consensus for MemoryLog {
    async fn propose_and_commit(&self, entry: LogEntry) -> ConsensusResult<LogIndex> {
        self.append(entry)
    }

    fn committed_index(&self) -> LogIndex {
        LogIndex::new(self.lock().entries.len() as u64)
    }

    fn subscribe(&self) -> LogSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        for position in 0..inner.delivered {
            // Receiver is still in scope, so this cannot fail.
            let _ = tx.send(inner.committed(position));
        }
        inner.subscribers.push(tx);
        rx
    }
}
