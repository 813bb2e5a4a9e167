//! Admission and apply counters
//!
//! - Counters only, monotonic, reset on process start
//! - Atomic increments with relaxed ordering

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by every node of a cluster.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    admissions_allowed: AtomicU64,
    admissions_rejected: AtomicU64,
    implicit_definitions: AtomicU64,
    defines_committed: AtomicU64,
    defines_conflicted: AtomicU64,
    drop_alls: AtomicU64,
    mutations_routed: AtomicU64,
    routing_failures: AtomicU64,
    duplicate_deliveries: AtomicU64,
    entries_applied: AtomicU64,
    proposal_timeouts: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_admissions_allowed(&self) {
        Self::bump(&self.admissions_allowed);
    }

    pub fn increment_admissions_rejected(&self) {
        Self::bump(&self.admissions_rejected);
    }

    /// Counts attributes, not requests
    pub fn add_implicit_definitions(&self, count: u64) {
        self.implicit_definitions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_defines_committed(&self, count: u64) {
        self.defines_committed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_defines_conflicted(&self) {
        Self::bump(&self.defines_conflicted);
    }

    pub fn increment_drop_alls(&self) {
        Self::bump(&self.drop_alls);
    }

    pub fn increment_mutations_routed(&self) {
        Self::bump(&self.mutations_routed);
    }

    pub fn increment_routing_failures(&self) {
        Self::bump(&self.routing_failures);
    }

    pub fn increment_duplicate_deliveries(&self) {
        Self::bump(&self.duplicate_deliveries);
    }

    pub fn increment_entries_applied(&self) {
        Self::bump(&self.entries_applied);
    }

    pub fn increment_proposal_timeouts(&self) {
        Self::bump(&self.proposal_timeouts);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            admissions_allowed: load(&self.admissions_allowed),
            admissions_rejected: load(&self.admissions_rejected),
            implicit_definitions: load(&self.implicit_definitions),
            defines_committed: load(&self.defines_committed),
            defines_conflicted: load(&self.defines_conflicted),
            drop_alls: load(&self.drop_alls),
            mutations_routed: load(&self.mutations_routed),
            routing_failures: load(&self.routing_failures),
            duplicate_deliveries: load(&self.duplicate_deliveries),
            entries_applied: load(&self.entries_applied),
            proposal_timeouts: load(&self.proposal_timeouts),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub admissions_allowed: u64,
    pub admissions_rejected: u64,
    pub implicit_definitions: u64,
    pub defines_committed: u64,
    pub defines_conflicted: u64,
    pub drop_alls: u64,
    pub mutations_routed: u64,
    pub routing_failures: u64,
    pub duplicate_deliveries: u64,
    /// Summed over every replica's apply path
    pub entries_applied: u64,
    pub proposal_timeouts: u64,
}
