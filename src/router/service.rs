//! Shard-side write service
//!
//! Each shard leader runs one service task that applies routed writes to
//! its storage one at a time. Request ids of recent successful writes are
//! remembered; a redelivered write is acknowledged without re-applying it.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::errors::{RoutingError, RoutingResult};
use super::transport::{ShardAck, ShardEndpoint, ShardRequest, ShardWrite};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::replica::ReplicaState;
use crate::storage::StorageEngine;

/// Request ids remembered per shard when none is configured
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

const QUEUE_DEPTH: usize = 256;

pub struct ShardService {
    replica: Arc<ReplicaState>,
    storage: Arc<dyn StorageEngine>,
    metrics: Arc<MetricsRegistry>,
    seen: Mutex<LruCache<Uuid, ShardAck>>,
}

impl ShardService {
    pub fn new(
        replica: Arc<ReplicaState>,
        storage: Arc<dyn StorageEngine>,
        metrics: Arc<MetricsRegistry>,
        dedup_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(dedup_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            replica,
            storage,
            metrics,
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Starts the service task and returns the endpoint to register.
    pub fn spawn(self) -> (ShardEndpoint, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ShardRequest>(QUEUE_DEPTH);
        let handle = tokio::spawn(async move {
            while let Some(ShardRequest { write, reply }) = rx.recv().await {
                let result = self.handle(write);
                // The router may have given up waiting; the write stands.
                let _ = reply.send(result);
            }
        });
        (tx, handle)
    }

    /// Applies one write, or returns the recorded ack for a duplicate.
    pub fn handle(&self, write: ShardWrite) -> RoutingResult<ShardAck> {
        let shard = self.replica.shard();
        if let Some(reason) = self.replica.halted() {
            return Err(RoutingError::Rejected {
                shard,
                reason: format!("replica halted: {}", reason),
            });
        }
        if write.shard != shard {
            return Err(RoutingError::WrongShard {
                expected: shard,
                received: write.shard,
            });
        }

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ack) = seen.get(&write.request_id) {
            self.metrics.increment_duplicate_deliveries();
            let request = write.request_id.to_string();
            let shard_str = shard.to_string();
            log_event(
                Event::DuplicateDelivery,
                &[("request_id", request.as_str()), ("shard", shard_str.as_str())],
            );
            return Ok(ShardAck {
                duplicate: true,
                ..ack.clone()
            });
        }

        let written = self
            .storage
            .apply_data_change(shard, &write.set, &write.delete)
            .map_err(|err| RoutingError::Rejected {
                shard,
                reason: err.to_string(),
            })?;

        let ack = ShardAck {
            shard,
            written,
            duplicate: false,
        };
        seen.put(write.request_id, ack.clone());
        Ok(ack)
    }
}
