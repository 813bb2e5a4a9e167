//! Drop-All Tests
//!
//! Drop-all is one committed entry:
//! - refused in disallow mode
//! - clears the registry on every replica
//! - wipes each shard's data exactly once, on the shard leader
//! - a failed wipe stops that replica from serving

use graphgate::membership::ShardId;
use graphgate::{Cluster, ClusterConfig, ClusterMode, GateError, Mutation, Operation};

// =============================================================================
// Helper Functions
// =============================================================================

async fn start(mode: ClusterMode) -> Cluster {
    let config = ClusterConfig::default().with_shards(2, 2).with_mode(mode);
    Cluster::start(config).await.unwrap()
}

/// Defines `name` on shard 1 and `age` on shard 2, one triple each.
async fn seed(cluster: &Cluster) {
    cluster
        .leader(1)
        .unwrap()
        .alter(&Operation::schema("name: string ."))
        .await
        .unwrap();
    cluster
        .leader(2)
        .unwrap()
        .alter(&Operation::schema("age: int ."))
        .await
        .unwrap();
    cluster
        .leader(1)
        .unwrap()
        .mutate(&Mutation::set("_:a <name> \"Alice\" .\n_:a <age> 30 ."))
        .await
        .unwrap();
}

// =============================================================================
// Successful Drops
// =============================================================================

#[tokio::test]
async fn test_drop_all_clears_every_replica() {
    let cluster = start(ClusterMode::Strict).await;
    seed(&cluster).await;
    assert_eq!(cluster.storage().triple_count(ShardId::new(1)), 1);
    assert_eq!(cluster.storage().triple_count(ShardId::new(2)), 1);

    let response = cluster
        .node(2, 1)
        .unwrap()
        .alter(&Operation::drop_all())
        .await
        .unwrap();
    assert!(response.dropped);
    assert!(response.entries.is_empty());

    cluster.settle().await.unwrap();
    for node in cluster.nodes() {
        assert!(node.registry().is_empty());
        assert_eq!(node.schema_text(), "");
    }
    assert_eq!(cluster.storage().triple_count(ShardId::new(1)), 0);
    assert_eq!(cluster.storage().triple_count(ShardId::new(2)), 0);
    // One wipe per shard, not per replica.
    assert_eq!(cluster.storage().wipe_count(), 2);
    assert_eq!(cluster.metrics().drop_alls, 1);
}

/// In strict mode, dropped attributes must be defined again.
#[tokio::test]
async fn test_strict_after_drop_needs_schema_again() {
    let cluster = start(ClusterMode::Strict).await;
    seed(&cluster).await;
    let node = cluster.leader(2).unwrap();
    node.alter(&Operation::drop_all()).await.unwrap();

    let err = node
        .mutate(&Mutation::set("_:b <name> \"Bob\" ."))
        .await
        .unwrap_err();
    assert_eq!(err, GateError::unknown_attributes(vec!["name".into()]));
}

/// In unrestricted mode the next write defines the attribute afresh,
/// owned by whichever shard received it.
#[tokio::test]
async fn test_unrestricted_after_drop_redefines_on_use() {
    let cluster = start(ClusterMode::Unrestricted).await;
    seed(&cluster).await;
    let s2 = cluster.leader(2).unwrap();
    s2.alter(&Operation::drop_all()).await.unwrap();

    let written = s2
        .mutate(&Mutation::set("_:b <name> \"Bob\" ."))
        .await
        .unwrap();
    assert_eq!(written.implicitly_defined, vec!["name".to_string()]);
    assert_eq!(s2.lookup("name").unwrap().owning_shard, ShardId::new(2));
    assert_eq!(cluster.storage().count_predicate(ShardId::new(1), "name"), 0);
    assert_eq!(cluster.storage().count_predicate(ShardId::new(2), "name"), 1);
}

// =============================================================================
// Refused Drops
// =============================================================================

#[tokio::test]
async fn test_drop_all_refused_after_switch_to_disallow() {
    let cluster = start(ClusterMode::Unrestricted).await;
    seed(&cluster).await;
    let node = cluster.leader(1).unwrap();
    node.set_mode(ClusterMode::Disallow).await.unwrap();

    let err = node.alter(&Operation::drop_all()).await.unwrap_err();
    assert!(err.to_string().contains("no mutations allowed"));

    cluster.settle().await.unwrap();
    assert_eq!(cluster.storage().triple_count(ShardId::new(1)), 1);
    assert_eq!(node.registry().len(), 2);
}

/// A drop proposed directly to the log after the switch commits but has
/// no effect on any replica.
#[tokio::test]
async fn test_drop_all_committed_after_disallow_is_inert() {
    let cluster = start(ClusterMode::Strict).await;
    seed(&cluster).await;
    let node = cluster.leader(1).unwrap();
    node.set_mode(ClusterMode::Disallow).await.unwrap();

    let err = node.schema_mutator().drop_all().await.unwrap_err();
    assert_eq!(err, GateError::ModeRejection);

    cluster.settle().await.unwrap();
    for node in cluster.nodes() {
        assert_eq!(node.registry().len(), 2);
    }
    assert_eq!(cluster.storage().wipe_count(), 0);
}

// =============================================================================
// Wipe Failures
// =============================================================================

#[tokio::test]
async fn test_failed_wipe_halts_the_shard_leader() {
    let cluster = start(ClusterMode::Strict).await;
    seed(&cluster).await;
    cluster.storage().set_failing(ShardId::new(2), true);

    // The proposing replica is on shard 1 and applies the drop normally.
    cluster
        .leader(1)
        .unwrap()
        .alter(&Operation::drop_all())
        .await
        .unwrap();

    let halted = cluster.leader(2).unwrap();
    let err = cluster.settle().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(halted.replica().halted().is_some());

    let refused = halted
        .alter(&Operation::schema("name: string ."))
        .await
        .unwrap_err();
    assert_eq!(refused.code(), "REPLICA_HALTED");

    // The follower of shard 2 does not touch storage and keeps serving.
    let follower = cluster.node(2, 1).unwrap();
    let snapshot = follower.read_committed().await.unwrap();
    assert!(snapshot.registry.is_empty());
    assert!(follower.replica().halted().is_none());
}
