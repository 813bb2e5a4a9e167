//! In-process cluster
//!
//! Wires every replica of every configured shard to one `MemoryLog`, one
//! `MemoryStorage` and one `LocalTransport`:
//!
//! - each replica gets an applier task following the log
//! - each shard leader runs a `ShardService` registered with the transport
//! - the configured startup mode is committed as the first log entry
//!
//! Used by the CLI and the integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{ClusterConfig, ConfigError};
use crate::consensus::{Consensus, LogIndex, MemoryLog};
use crate::errors::GateError;
use crate::membership::{ShardId, ShardMembership};
use crate::mode::ClusterMode;
use crate::node::Node;
use crate::observability::{log_event, Event, Logger, MetricsRegistry, MetricsSnapshot};
use crate::replica::{spawn_applier, Proposer, ReplicaState};
use crate::router::{LocalTransport, MutationRouter, ShardService};
use crate::storage::MemoryStorage;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to commit startup mode: {0}")]
    Bootstrap(#[from] GateError),
}

pub struct Cluster {
    config: ClusterConfig,
    log: Arc<MemoryLog>,
    storage: Arc<MemoryStorage>,
    transport: Arc<LocalTransport>,
    membership: Arc<ShardMembership>,
    metrics: Arc<MetricsRegistry>,
    nodes: BTreeMap<ShardId, Vec<Arc<Node>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Builds the cluster and commits the startup mode.
    ///
    /// Returns once every replica has applied the bootstrap entry.
    pub async fn start(config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        Logger::set_min_severity(config.log_severity()?);
        let startup_mode = config.startup_mode()?;

        let mut membership = ShardMembership::new(1);
        for (&id, &replicas) in &config.shards {
            for _ in 0..replicas {
                membership.add_replica(ShardId::new(id), Uuid::new_v4());
            }
        }
        let membership = Arc::new(membership);

        let log = Arc::new(MemoryLog::new());
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(LocalTransport::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let router = MutationRouter::new(
            membership.clone(),
            transport.clone(),
            metrics.clone(),
            config.route_timeout(),
            config.route_attempts,
        );

        let mut nodes: BTreeMap<ShardId, Vec<Arc<Node>>> = BTreeMap::new();
        let mut tasks = Vec::new();
        for shard in membership.shard_ids() {
            for &replica_id in membership.replicas_of(shard) {
                let replica = Arc::new(ReplicaState::new(
                    replica_id,
                    shard,
                    membership.clone(),
                    storage.clone(),
                    metrics.clone(),
                ));
                tasks.push(spawn_applier(replica.clone(), log.subscribe()));

                if replica.is_shard_leader() {
                    let service = ShardService::new(
                        replica.clone(),
                        storage.clone(),
                        metrics.clone(),
                        config.dedup_capacity,
                    );
                    let (endpoint, handle) = service.spawn();
                    transport.register(replica_id, endpoint);
                    tasks.push(handle);
                }

                let proposer = Proposer::new(
                    log.clone(),
                    replica,
                    metrics.clone(),
                    config.propose_timeout(),
                );
                let shard_str = shard.to_string();
                let replica_str = replica_id.to_string();
                log_event(
                    Event::NodeStarted,
                    &[("replica", replica_str.as_str()), ("shard", shard_str.as_str())],
                );
                nodes
                    .entry(shard)
                    .or_default()
                    .push(Arc::new(Node::new(proposer, router.clone())));
            }
        }

        let cluster = Self {
            config,
            log,
            storage,
            transport,
            membership,
            metrics,
            nodes,
            tasks,
        };

        if let Some(first) = cluster.nodes().next() {
            first.set_mode(startup_mode).await?;
        }
        for node in cluster.nodes() {
            node.replica()
                .wait_applied(LogIndex::new(1))
                .await
                .map_err(GateError::from)?;
        }

        let shards = cluster.membership.shard_count().to_string();
        log_event(
            Event::ClusterStarted,
            &[("mode", startup_mode.as_str()), ("shards", shards.as_str())],
        );
        Ok(cluster)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The `index`-th replica of `shard` (0 is the shard leader)
    pub fn node(&self, shard: u32, index: usize) -> Option<Arc<Node>> {
        self.nodes
            .get(&ShardId::new(shard))
            .and_then(|replicas| replicas.get(index))
            .cloned()
    }

    pub fn leader(&self, shard: u32) -> Option<Arc<Node>> {
        self.node(shard, 0)
    }

    /// Every node, by shard then replica order
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values().flatten()
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.nodes.keys().copied().collect()
    }

    pub fn log(&self) -> &Arc<MemoryLog> {
        &self.log
    }

    pub fn storage(&self) -> &Arc<MemoryStorage> {
        &self.storage
    }

    pub fn transport(&self) -> &Arc<LocalTransport> {
        &self.transport
    }

    pub fn membership(&self) -> &Arc<ShardMembership> {
        &self.membership
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Mode as applied on the first node
    pub fn mode(&self) -> Option<ClusterMode> {
        self.nodes().next().map(|node| node.mode())
    }

    /// Waits until every replica has applied the whole log.
    pub async fn settle(&self) -> Result<(), GateError> {
        let target = self.log.len() as u64;
        for node in self.nodes() {
            node.replica()
                .wait_applied(LogIndex::new(target))
                .await?;
        }
        Ok(())
    }

    /// Stops every background task.
    pub fn shutdown(self) {
        let shards = self.membership.shard_count().to_string();
        log_event(Event::ClusterStopped, &[("shards", shards.as_str())]);
        // Drop aborts the tasks.
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
