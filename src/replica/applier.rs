//! Applier task
//!
//! Drains a replica's log subscription into `ReplicaState::apply`, in order.
//! The task ends when the log closes or the replica halts.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::state::ReplicaState;
use crate::consensus::LogSubscription;

pub fn spawn_applier(replica: Arc<ReplicaState>, mut subscription: LogSubscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(committed) = subscription.recv().await {
            if replica.apply(committed).is_err() {
                // Halt is already logged and published by the replica.
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{Consensus, LogEntry, LogIndex, MemoryLog};
    use crate::membership::{ShardId, ShardMembership};
    use crate::mode::ClusterMode;
    use crate::observability::MetricsRegistry;
    use crate::storage::MemoryStorage;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_applier_follows_log() {
        let replica_id = Uuid::new_v4();
        let mut membership = ShardMembership::new(1);
        membership.add_replica(ShardId::new(1), replica_id);
        let replica = Arc::new(ReplicaState::new(
            replica_id,
            ShardId::new(1),
            Arc::new(membership),
            Arc::new(MemoryStorage::new()),
            Arc::new(MetricsRegistry::new()),
        ));

        let log = MemoryLog::new();
        let handle = spawn_applier(replica.clone(), log.subscribe());
        let index = log
            .propose_and_commit(LogEntry::SetMode {
                mode: ClusterMode::Strict,
            })
            .await
            .unwrap();

        replica.wait_applied(index).await.unwrap();
        assert_eq!(replica.mode(), ClusterMode::Strict);
        assert_eq!(replica.applied_index(), LogIndex::new(1));
        handle.abort();
    }
}
