//! Shard Membership Table
//!
//! Static per epoch: which replicas serve which shard. This subsystem only
//! reads it; membership changes happen outside of admission control.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shard (group) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(u32);

impl ShardId {
    /// Create a shard id
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric id
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Mapping of shard ids to the replicas serving them for one epoch.
///
/// The first replica listed for a shard is the one the router addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMembership {
    epoch: u64,
    shards: BTreeMap<ShardId, Vec<Uuid>>,
}

impl ShardMembership {
    /// Create an empty table for the given epoch
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            shards: BTreeMap::new(),
        }
    }

    /// Add a replica to a shard, creating the shard entry if needed.
    pub fn add_replica(&mut self, shard: ShardId, replica: Uuid) {
        let replicas = self.shards.entry(shard).or_default();
        if !replicas.contains(&replica) {
            replicas.push(replica);
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the shard is part of this epoch
    pub fn contains(&self, shard: ShardId) -> bool {
        self.shards.contains_key(&shard)
    }

    /// Replicas serving a shard, in routing preference order
    pub fn replicas_of(&self, shard: ShardId) -> &[Uuid] {
        self.shards.get(&shard).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Replica that receives routed writes for a shard
    pub fn leader_of(&self, shard: ShardId) -> Option<Uuid> {
        self.replicas_of(shard).first().copied()
    }

    /// Shard a replica belongs to
    pub fn shard_of(&self, replica: Uuid) -> Option<ShardId> {
        self.shards
            .iter()
            .find(|(_, replicas)| replicas.contains(&replica))
            .map(|(shard, _)| *shard)
    }

    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.shards.keys().copied()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
