//! Proposal path
//!
//! A proposal is acknowledged only after its entry is committed AND applied
//! on the proposing replica, so the caller's next local read sees it.
//!
//! On timeout the outcome is unknown: the entry may still commit. Callers
//! re-read mode or registry before retrying.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use super::outcome::ApplyOutcome;
use super::state::ReplicaState;
use crate::consensus::{Consensus, LogEntry, LogIndex};
use crate::errors::{GateError, GateResult};
use crate::observability::{log_event, Event, MetricsRegistry};

/// Submits configuration entries on behalf of one replica.
#[derive(Clone)]
pub struct Proposer {
    consensus: Arc<dyn Consensus>,
    replica: Arc<ReplicaState>,
    metrics: Arc<MetricsRegistry>,
    timeout: Duration,
}

impl Proposer {
    pub fn new(
        consensus: Arc<dyn Consensus>,
        replica: Arc<ReplicaState>,
        metrics: Arc<MetricsRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            consensus,
            replica,
            metrics,
            timeout,
        }
    }

    /// Same proposer with a different caller-supplied timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn replica(&self) -> &Arc<ReplicaState> {
        &self.replica
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Commit `entry` and wait for the local apply outcome.
    pub async fn submit(&self, entry: LogEntry) -> GateResult<(LogIndex, ApplyOutcome)> {
        self.replica.check_serving()?;
        let started = Instant::now();
        let deadline = started + self.timeout;
        let kind = entry.kind();

        let index = match timeout_at(deadline, self.consensus.propose_and_commit(entry)).await {
            Ok(committed) => committed?,
            Err(_) => return Err(self.timed_out(kind, None, started)),
        };

        match timeout_at(deadline, self.replica.wait_applied(index)).await {
            Ok(applied) => applied?,
            Err(_) => return Err(self.timed_out(kind, Some(index), started)),
        }

        // Retention is bounded; an evicted outcome is as good as unknown.
        match self.replica.outcome(index) {
            Some(outcome) => Ok((index, outcome)),
            None => Err(GateError::ConsensusTimeout {
                index: Some(index),
                waited_ms: elapsed_ms(started),
            }),
        }
    }

    /// Wait until this replica has applied everything committed so far.
    ///
    /// Bounded by the proposer timeout. On timeout the caller proceeds with
    /// the state it has; only a halt is an error.
    pub async fn read_barrier(&self) -> GateResult<()> {
        let target = self.consensus.committed_index();
        let deadline = Instant::now() + self.timeout;
        match timeout_at(deadline, self.replica.wait_applied(target)).await {
            Ok(applied) => Ok(applied?),
            Err(_) => {
                let target = target.to_string();
                let applied = self.replica.applied_index().to_string();
                log_event(
                    Event::ReadBarrierTimeout,
                    &[("applied", applied.as_str()), ("target", target.as_str())],
                );
                Ok(())
            }
        }
    }

    fn timed_out(&self, kind: &str, index: Option<LogIndex>, started: Instant) -> GateError {
        let waited_ms = elapsed_ms(started);
        self.metrics.increment_proposal_timeouts();
        let index_str = index.map_or_else(|| "unassigned".to_string(), |i| i.to_string());
        let waited = waited_ms.to_string();
        log_event(
            Event::ProposalTimeout,
            &[
                ("entry", kind),
                ("index", index_str.as_str()),
                ("waited_ms", waited.as_str()),
            ],
        );
        GateError::ConsensusTimeout { index, waited_ms }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
