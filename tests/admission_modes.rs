//! Admission Mode Tests
//!
//! Each test boots an in-process cluster in one mode and checks the
//! policy table end to end:
//! - disallow rejects every Alter and Mutate
//! - strict admits schema changes and data on defined attributes only
//! - allow defines unknown attributes on first use

use graphgate::membership::ShardId;
use graphgate::{Cluster, ClusterConfig, ClusterMode, GateError, Mutation, Operation};

// =============================================================================
// Helper Functions
// =============================================================================

async fn start(mode: ClusterMode, shards: u32, replicas: usize) -> Cluster {
    let config = ClusterConfig::default()
        .with_shards(shards, replicas)
        .with_mode(mode);
    Cluster::start(config).await.unwrap()
}

fn name_alice() -> Mutation {
    Mutation::set(r#"_:a <name> "Alice" ."#)
}

// =============================================================================
// Disallow
// =============================================================================

/// Every request fails with the same message, on every replica.
#[tokio::test]
async fn test_disallow_rejects_everything_everywhere() {
    let cluster = start(ClusterMode::Disallow, 2, 2).await;

    for node in cluster.nodes() {
        let alter = node
            .alter(&Operation::schema("name: string ."))
            .await
            .unwrap_err();
        assert_eq!(alter, GateError::ModeRejection);
        assert!(alter.to_string().contains("no mutations allowed"));

        let drop = node.alter(&Operation::drop_all()).await.unwrap_err();
        assert!(drop.to_string().contains("no mutations allowed"));

        let mutate = node.mutate(&name_alice()).await.unwrap_err();
        assert!(mutate.to_string().contains("no mutations allowed"));
    }

    assert!(cluster.leader(1).unwrap().registry().is_empty());
    assert_eq!(cluster.storage().triple_count(ShardId::new(1)), 0);
    assert_eq!(cluster.storage().triple_count(ShardId::new(2)), 0);
}

/// Garbage is refused with the mode message before it is parsed.
#[tokio::test]
async fn test_disallow_checked_before_parsing() {
    let cluster = start(ClusterMode::Disallow, 1, 1).await;
    let node = cluster.leader(1).unwrap();

    let alter = node.alter(&Operation::schema("not a schema")).await;
    assert_eq!(alter.unwrap_err(), GateError::ModeRejection);

    let mutate = node.mutate(&Mutation::set("<<<")).await;
    assert_eq!(mutate.unwrap_err(), GateError::ModeRejection);
}

/// Attributes defined before the switch stay defined.
#[tokio::test]
async fn test_disallow_keeps_earlier_definitions() {
    let cluster = start(ClusterMode::Strict, 1, 2).await;
    let node = cluster.leader(1).unwrap();
    node.alter(&Operation::schema("name: string ."))
        .await
        .unwrap();

    node.set_mode(ClusterMode::Disallow).await.unwrap();
    cluster.settle().await.unwrap();

    let follower = cluster.node(1, 1).unwrap();
    assert_eq!(follower.mode(), ClusterMode::Disallow);
    assert!(follower.lookup("name").is_some());
    assert_eq!(
        follower.mutate(&name_alice()).await.unwrap_err(),
        GateError::ModeRejection
    );
}

// =============================================================================
// Strict
// =============================================================================

#[tokio::test]
async fn test_strict_end_to_end() {
    let cluster = start(ClusterMode::Strict, 2, 1).await;
    let s1 = cluster.leader(1).unwrap();
    let s2 = cluster.leader(2).unwrap();

    let altered = s1
        .alter(&Operation::schema("name: string @index(exact) ."))
        .await
        .unwrap();
    assert_eq!(altered.entries.len(), 1);
    assert_eq!(altered.entries[0].owning_shard, ShardId::new(1));

    // Shard 2 never defined `name` but sees it after its read barrier.
    let written = s2.mutate(&name_alice()).await.unwrap();
    assert_eq!(written.shards, vec![ShardId::new(1)]);
    assert!(written.implicitly_defined.is_empty());
    assert_eq!(cluster.storage().count_predicate(ShardId::new(1), "name"), 1);

    let rejected = s1.mutate(&Mutation::set("_:b <age> 5 .")).await.unwrap_err();
    assert!(rejected.to_string().contains("schema not defined for predicate"));
    assert_eq!(rejected, GateError::unknown_attributes(vec!["age".into()]));
    assert!(s1.lookup("age").is_none());
}

/// One unknown attribute fails the whole batch; nothing is written.
#[tokio::test]
async fn test_strict_batch_is_all_or_nothing() {
    let cluster = start(ClusterMode::Strict, 2, 1).await;
    let s1 = cluster.leader(1).unwrap();
    s1.alter(&Operation::schema("name: string ."))
        .await
        .unwrap();

    let batch = Mutation::set("_:a <name> \"Alice\" .\n_:a <age> 30 .\n_:a <city> \"Oslo\" .");
    let err = s1.mutate(&batch).await.unwrap_err();
    assert_eq!(
        err,
        GateError::unknown_attributes(vec!["age".into(), "city".into()])
    );
    assert_eq!(cluster.storage().triple_count(ShardId::new(1)), 0);
    assert_eq!(s1.registry().len(), 1);
}

/// Deleting on an undefined attribute is refused the same way.
#[tokio::test]
async fn test_strict_delete_needs_definition() {
    let cluster = start(ClusterMode::Strict, 1, 1).await;
    let node = cluster.leader(1).unwrap();
    let err = node
        .mutate(&Mutation::delete("<0x1> <nickname> * ."))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("schema not defined for predicate"));
}

#[tokio::test]
async fn test_strict_allows_drop_all() {
    let cluster = start(ClusterMode::Strict, 1, 1).await;
    let node = cluster.leader(1).unwrap();
    node.alter(&Operation::schema("name: string ."))
        .await
        .unwrap();
    let dropped = node.alter(&Operation::drop_all()).await.unwrap();
    assert!(dropped.dropped);
    assert!(node.registry().is_empty());
}

// =============================================================================
// Unrestricted
// =============================================================================

#[tokio::test]
async fn test_unrestricted_defines_on_first_use() {
    let cluster = start(ClusterMode::Unrestricted, 2, 2).await;
    let s2 = cluster.node(2, 1).unwrap();

    let written = s2
        .mutate(&Mutation::set("_:a <name> \"Alice\" .\n_:a <age> 30 ."))
        .await
        .unwrap();
    assert_eq!(written.implicitly_defined, vec!["age".to_string(), "name".to_string()]);
    assert_eq!(written.written, 2);

    // Implicit entries are owned by the shard that received the request.
    let age = s2.lookup("age").unwrap();
    assert_eq!(age.owning_shard, ShardId::new(2));
    assert_eq!(age.definition.value_type.type_name(), "int");
    assert_eq!(cluster.storage().triple_count(ShardId::new(2)), 2);

    cluster.settle().await.unwrap();
    for node in cluster.nodes() {
        assert_eq!(node.registry().len(), 2);
    }
}

/// A later explicit define that disagrees with the inferred one conflicts.
#[tokio::test]
async fn test_unrestricted_inferred_definition_is_first_committer() {
    let cluster = start(ClusterMode::Unrestricted, 1, 1).await;
    let node = cluster.leader(1).unwrap();
    node.mutate(&Mutation::set("_:a <age> 30 ."))
        .await
        .unwrap();

    let err = node
        .alter(&Operation::schema("age: string ."))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_CONFLICT");

    let same = node.alter(&Operation::schema("age: int .")).await.unwrap();
    assert_eq!(same.entries[0].version, 1);
}

// =============================================================================
// Live Mode Changes
// =============================================================================

#[tokio::test]
async fn test_mode_changes_apply_in_log_order() {
    let cluster = start(ClusterMode::Unrestricted, 2, 1).await;
    let s1 = cluster.leader(1).unwrap();
    let s2 = cluster.leader(2).unwrap();

    s1.set_mode(ClusterMode::Strict).await.unwrap();
    let err = s2.mutate(&name_alice()).await.unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_ATTRIBUTE");

    s2.set_mode(ClusterMode::Unrestricted).await.unwrap();
    s1.mutate(&name_alice()).await.unwrap();
    assert_eq!(cluster.mode(), Some(ClusterMode::Unrestricted));
}
