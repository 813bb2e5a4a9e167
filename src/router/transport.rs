//! Shard-to-shard transport
//!
//! Writes cross shards as request/response messages. `LocalTransport`
//! connects in-process shard services over tokio channels; endpoints can
//! be disconnected or slowed down to simulate network faults.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::errors::{RoutingError, RoutingResult};
use crate::membership::ShardId;
use crate::mutation::Triple;

/// One shard's part of a routed DataChange.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardWrite {
    /// Id of the originating DataChange, shared by every part and retry
    pub request_id: Uuid,
    pub shard: ShardId,
    pub set: Vec<Triple>,
    pub delete: Vec<Triple>,
}

/// Owning shard's answer to a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardAck {
    pub shard: ShardId,
    pub written: usize,
    /// The request id was already applied; nothing was re-applied
    pub duplicate: bool,
}

/// Message delivered to a shard service
#[derive(Debug)]
pub struct ShardRequest {
    pub write: ShardWrite,
    pub reply: oneshot::Sender<RoutingResult<ShardAck>>,
}

pub type ShardEndpoint = mpsc::Sender<ShardRequest>;

/// Sends a write to a specific replica and waits for its answer.
#[async_trait]
pub trait ShardTransport: Send + Sync {
    async fn send(&self, target: Uuid, write: ShardWrite) -> RoutingResult<ShardAck>;
}

#[derive(Default)]
struct Endpoints {
    senders: HashMap<Uuid, ShardEndpoint>,
    /// Extra latency added before the reply is read
    delays: HashMap<Uuid, Duration>,
}

/// In-process transport
#[derive(Default)]
pub struct LocalTransport {
    endpoints: RwLock<Endpoints>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Endpoints> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Endpoints> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, replica: Uuid, endpoint: ShardEndpoint) {
        self.write().senders.insert(replica, endpoint);
    }

    /// Removes the endpoint, returning it so it can be reconnected
    pub fn disconnect(&self, replica: Uuid) -> Option<ShardEndpoint> {
        self.write().senders.remove(&replica)
    }

    pub fn is_connected(&self, replica: Uuid) -> bool {
        self.read().senders.contains_key(&replica)
    }

    /// Delay replies from `replica`; `None` clears the delay
    pub fn set_delay(&self, replica: Uuid, delay: Option<Duration>) {
        let mut endpoints = self.write();
        match delay {
            Some(delay) => endpoints.delays.insert(replica, delay),
            None => endpoints.delays.remove(&replica),
        };
    }
}

#[async_trait]
impl ShardTransport for LocalTransport {
    async fn send(&self, target: Uuid, write: ShardWrite) -> RoutingResult<ShardAck> {
        let shard = write.shard;
        let (sender, delay) = {
            let endpoints = self.read();
            let sender = endpoints.senders.get(&target).cloned();
            (sender, endpoints.delays.get(&target).copied())
        };
        let sender = sender.ok_or_else(|| RoutingError::Unreachable {
            shard,
            reason: format!("no endpoint for replica {}", target),
        })?;

        let (reply, response) = oneshot::channel();
        sender
            .send(ShardRequest { write, reply })
            .await
            .map_err(|_| RoutingError::Unreachable {
                shard,
                reason: "endpoint closed".into(),
            })?;

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        response.await.map_err(|_| RoutingError::Unreachable {
            shard,
            reason: "endpoint dropped the request".into(),
        })?
    }
}
