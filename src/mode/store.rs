//! Cluster Mode Store
//!
//! `get` reads the mode last applied on this replica. `propose` is the only
//! way to change it: the new mode goes through the consensus log and the
//! call returns once this replica has applied it. Other replicas follow as
//! their own appliers reach the same index.

use std::time::Duration;

use super::types::ClusterMode;
use crate::consensus::LogEntry;
use crate::errors::{GateError, GateResult};
use crate::replica::{ApplyOutcome, Proposer};

#[derive(Clone)]
pub struct ModeStore {
    proposer: Proposer,
}

impl ModeStore {
    pub fn new(proposer: Proposer) -> Self {
        Self { proposer }
    }

    /// Local, non-blocking read
    pub fn get(&self) -> ClusterMode {
        self.proposer.replica().mode()
    }

    /// Switch the cluster mode, waiting at most the configured proposal timeout.
    pub async fn propose(&self, mode: ClusterMode) -> GateResult<ClusterMode> {
        Self::submit(&self.proposer, mode).await
    }

    pub async fn propose_with_timeout(
        &self,
        mode: ClusterMode,
        timeout: Duration,
    ) -> GateResult<ClusterMode> {
        Self::submit(&self.proposer.with_timeout(timeout), mode).await
    }

    async fn submit(proposer: &Proposer, mode: ClusterMode) -> GateResult<ClusterMode> {
        let (index, outcome) = proposer.submit(LogEntry::SetMode { mode }).await?;
        match outcome {
            ApplyOutcome::ModeSet { mode } => Ok(mode),
            other => Err(GateError::invalid_request(format!(
                "log index {} applied as {:?}, not a mode change",
                index, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::consensus::{Consensus, MemoryLog};
    use crate::membership::{ShardId, ShardMembership};
    use crate::observability::MetricsRegistry;
    use crate::replica::{spawn_applier, ReplicaState};
    use crate::storage::MemoryStorage;

    fn store_on(log: &Arc<MemoryLog>, membership: &Arc<ShardMembership>, replica_id: Uuid, shard: u32) -> ModeStore {
        let metrics = Arc::new(MetricsRegistry::new());
        let replica = Arc::new(ReplicaState::new(
            replica_id,
            ShardId::new(shard),
            membership.clone(),
            Arc::new(MemoryStorage::new()),
            metrics.clone(),
        ));
        spawn_applier(replica.clone(), log.subscribe());
        ModeStore::new(Proposer::new(log.clone(), replica, metrics, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_propose_is_visible_locally_on_return() {
        let log = Arc::new(MemoryLog::new());
        let a = Uuid::new_v4();
        let mut membership = ShardMembership::new(1);
        membership.add_replica(ShardId::new(1), a);
        let store = store_on(&log, &Arc::new(membership), a, 1);

        assert_eq!(store.get(), ClusterMode::Disallow);
        assert_eq!(store.propose(ClusterMode::Strict).await.unwrap(), ClusterMode::Strict);
        assert_eq!(store.get(), ClusterMode::Strict);
    }

    #[tokio::test]
    async fn test_other_shards_follow_the_log() {
        let log = Arc::new(MemoryLog::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut membership = ShardMembership::new(1);
        membership.add_replica(ShardId::new(1), a);
        membership.add_replica(ShardId::new(2), b);
        let membership = Arc::new(membership);
        let first = store_on(&log, &membership, a, 1);
        let second = store_on(&log, &membership, b, 2);

        first.propose(ClusterMode::Unrestricted).await.unwrap();
        second
            .proposer
            .replica()
            .wait_applied(log.committed_index())
            .await
            .unwrap();
        assert_eq!(second.get(), ClusterMode::Unrestricted);
    }

    #[tokio::test]
    async fn test_quorum_loss_fails_the_proposal() {
        let log = Arc::new(MemoryLog::new());
        let a = Uuid::new_v4();
        let mut membership = ShardMembership::new(1);
        membership.add_replica(ShardId::new(1), a);
        let store = store_on(&log, &Arc::new(membership), a, 1);

        log.set_available(false);
        let err = store.propose(ClusterMode::Strict).await.unwrap_err();
        assert!(matches!(err, GateError::ConsensusUnavailable(_)));
        assert_eq!(store.get(), ClusterMode::Disallow);
    }
}
