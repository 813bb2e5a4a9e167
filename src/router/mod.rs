//! Mutation Router
//!
//! Splits an admitted DataChange by owning shard (from the registry
//! snapshot the gate used) and sends each part to that shard's leader,
//! whichever replica received the client request.
//!
//! - parts are sent one after another, at most one attempt outstanding
//! - every part and every retry carries the DataChange's request id
//! - a timed-out attempt is retried; the shard's dedup cache makes that safe
//! - an unreachable owner is an error, never a reason to pick another shard

mod errors;
mod service;
mod transport;

pub use errors::{RoutingError, RoutingResult};
pub use service::{ShardService, DEFAULT_DEDUP_CAPACITY};
pub use transport::{
    LocalTransport, ShardAck, ShardEndpoint, ShardRequest, ShardTransport, ShardWrite,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::membership::{ShardId, ShardMembership};
use crate::mutation::{DataChange, Triple};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::schema::SchemaRegistry;

/// Acks for every shard a DataChange touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    pub request_id: Uuid,
    pub acks: Vec<ShardAck>,
}

impl RouteReport {
    /// Triples written, not counting duplicate deliveries
    pub fn written(&self) -> usize {
        self.acks
            .iter()
            .filter(|ack| !ack.duplicate)
            .map(|ack| ack.written)
            .sum()
    }

    pub fn shards(&self) -> Vec<ShardId> {
        self.acks.iter().map(|ack| ack.shard).collect()
    }
}

#[derive(Clone)]
pub struct MutationRouter {
    membership: Arc<ShardMembership>,
    transport: Arc<dyn ShardTransport>,
    metrics: Arc<MetricsRegistry>,
    attempt_timeout: Duration,
    attempts: u32,
}

impl MutationRouter {
    pub fn new(
        membership: Arc<ShardMembership>,
        transport: Arc<dyn ShardTransport>,
        metrics: Arc<MetricsRegistry>,
        attempt_timeout: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            membership,
            transport,
            metrics,
            attempt_timeout,
            attempts: attempts.max(1),
        }
    }

    /// Partition a DataChange by owning shard.
    pub fn plan(
        &self,
        change: &DataChange,
        registry: &SchemaRegistry,
    ) -> RoutingResult<Vec<ShardWrite>> {
        let mut parts: BTreeMap<ShardId, (Vec<Triple>, Vec<Triple>)> = BTreeMap::new();
        let owner = |triple: &Triple| {
            registry
                .owner_of(&triple.predicate)
                .ok_or_else(|| RoutingError::NoOwner(triple.predicate.clone()))
        };
        for triple in &change.set {
            parts.entry(owner(triple)?).or_default().0.push(triple.clone());
        }
        for triple in &change.delete {
            parts.entry(owner(triple)?).or_default().1.push(triple.clone());
        }

        Ok(parts
            .into_iter()
            .map(|(shard, (set, delete))| ShardWrite {
                request_id: change.request_id,
                shard,
                set,
                delete,
            })
            .collect())
    }

    /// Deliver every part of `change` to its owning shard.
    ///
    /// Parts already delivered before a failure stay applied; retrying the
    /// same DataChange (same request id) completes it without duplicates.
    pub async fn route(
        &self,
        change: &DataChange,
        registry: &SchemaRegistry,
    ) -> RoutingResult<RouteReport> {
        let parts = self.plan(change, registry)?;
        let mut acks = Vec::with_capacity(parts.len());
        for part in parts {
            match self.deliver(part).await {
                Ok(ack) => acks.push(ack),
                Err(err) => {
                    self.metrics.increment_routing_failures();
                    let request = change.request_id.to_string();
                    let detail = err.to_string();
                    log_event(
                        Event::RoutingFailed,
                        &[
                            ("code", err.code()),
                            ("error", detail.as_str()),
                            ("request_id", request.as_str()),
                        ],
                    );
                    return Err(err);
                }
            }
        }

        self.metrics.increment_mutations_routed();
        let report = RouteReport {
            request_id: change.request_id,
            acks,
        };
        let request = change.request_id.to_string();
        let shards = report
            .shards()
            .iter()
            .map(ShardId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        log_event(
            Event::MutationRouted,
            &[("request_id", request.as_str()), ("shards", shards.as_str())],
        );
        Ok(report)
    }

    async fn deliver(&self, part: ShardWrite) -> RoutingResult<ShardAck> {
        let shard = part.shard;
        let leader = self
            .membership
            .leader_of(shard)
            .ok_or_else(|| RoutingError::Unreachable {
                shard,
                reason: "no replica in membership table".into(),
            })?;

        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let result = match timeout(self.attempt_timeout, self.transport.send(leader, part.clone())).await {
                Ok(result) => result,
                Err(_) => Err(RoutingError::Timeout {
                    shard,
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                }),
            };
            match result {
                Err(err) if err.is_retryable() && attempt < self.attempts => attempt += 1,
                other => return other,
            }
        }
    }
}
