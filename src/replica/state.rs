//! Per-replica applied state
//!
//! `apply` is the single ordered path that changes a replica's mode and
//! schema registry. It runs on the replica's applier task, one committed
//! entry at a time, and resolves define races deterministically: every
//! replica reaches the same outcome for the same index.
//!
//! Readers never block the apply path for long: `snapshot()` clones an
//! `im::OrdMap`, which is O(1).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use uuid::Uuid;

use super::halt::HaltReason;
use super::outcome::{ApplyOutcome, RejectCause};
use crate::consensus::{CommittedEntry, LogEntry, LogIndex};
use crate::membership::{ShardId, ShardMembership};
use crate::mode::ClusterMode;
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::schema::{
    AttributeSchema, DefineResolution, ExtendResolution, IndexKind, NamedDefinition,
    SchemaRegistry,
};
use crate::storage::StorageEngine;

/// Applied outcomes kept for proposers to collect
const OUTCOME_RETENTION: usize = 4096;

/// Mode the replica reports before the bootstrap entry is applied
const INITIAL_MODE: ClusterMode = ClusterMode::Disallow;

/// Consistent view of a replica's applied state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub applied_index: LogIndex,
    pub mode: ClusterMode,
    pub registry: SchemaRegistry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Progress {
    applied: LogIndex,
    halted: Option<HaltReason>,
}

#[derive(Debug)]
struct AppliedState {
    applied_index: LogIndex,
    mode: ClusterMode,
    registry: SchemaRegistry,
    halted: Option<HaltReason>,
}

/// One replica of one shard.
pub struct ReplicaState {
    replica_id: Uuid,
    shard: ShardId,
    membership: Arc<ShardMembership>,
    storage: Arc<dyn StorageEngine>,
    metrics: Arc<MetricsRegistry>,
    state: RwLock<AppliedState>,
    outcomes: Mutex<BTreeMap<LogIndex, ApplyOutcome>>,
    progress: watch::Sender<Progress>,
}

impl ReplicaState {
    pub fn new(
        replica_id: Uuid,
        shard: ShardId,
        membership: Arc<ShardMembership>,
        storage: Arc<dyn StorageEngine>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (progress, _) = watch::channel(Progress {
            applied: LogIndex::ZERO,
            halted: None,
        });
        Self {
            replica_id,
            shard,
            membership,
            storage,
            metrics,
            state: RwLock::new(AppliedState {
                applied_index: LogIndex::ZERO,
                mode: INITIAL_MODE,
                registry: SchemaRegistry::new(),
                halted: None,
            }),
            outcomes: Mutex::new(BTreeMap::new()),
            progress,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, AppliedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AppliedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outcomes(&self) -> MutexGuard<'_, BTreeMap<LogIndex, ApplyOutcome>> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replica_id(&self) -> Uuid {
        self.replica_id
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn membership(&self) -> &ShardMembership {
        &self.membership
    }

    /// Whether this replica is the one its shard's writes are addressed to
    pub fn is_shard_leader(&self) -> bool {
        self.membership.leader_of(self.shard) == Some(self.replica_id)
    }

    /// Last applied mode. Local and non-blocking.
    pub fn mode(&self) -> ClusterMode {
        self.read_state().mode
    }

    /// Last applied registry
    pub fn registry(&self) -> SchemaRegistry {
        self.read_state().registry.clone()
    }

    pub fn lookup(&self, name: &str) -> Option<AttributeSchema> {
        self.read_state().registry.lookup(name).cloned()
    }

    pub fn applied_index(&self) -> LogIndex {
        self.read_state().applied_index
    }

    /// Mode, registry and index taken under one lock
    pub fn snapshot(&self) -> ReplicaSnapshot {
        let state = self.read_state();
        ReplicaSnapshot {
            applied_index: state.applied_index,
            mode: state.mode,
            registry: state.registry.clone(),
        }
    }

    pub fn halted(&self) -> Option<HaltReason> {
        self.read_state().halted
    }

    /// Fails once the replica has halted
    pub fn check_serving(&self) -> Result<(), HaltReason> {
        match self.halted() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Outcome recorded for an applied index, while still retained
    pub fn outcome(&self, index: LogIndex) -> Option<ApplyOutcome> {
        self.lock_outcomes().get(&index).cloned()
    }

    /// Waits until `index` is applied locally, or the replica halts.
    pub async fn wait_applied(&self, index: LogIndex) -> Result<(), HaltReason> {
        let mut rx = self.progress.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|progress| progress.halted.is_some() || progress.applied >= index)
            .await;
        self.check_serving()
    }

    /// Applies the next committed entry.
    ///
    /// Entries must arrive with contiguous indexes. A gap, an unknown
    /// owning shard, or a failed wipe halts the replica for good.
    pub fn apply(&self, committed: CommittedEntry) -> Result<ApplyOutcome, HaltReason> {
        let CommittedEntry { index, entry } = committed;
        let mut state = self.write_state();
        if let Some(reason) = state.halted {
            return Err(reason);
        }

        let expected = state.applied_index.next();
        if index != expected {
            return Err(self.halt(
                state,
                HaltReason::NonContiguousApply {
                    expected,
                    received: index,
                },
            ));
        }

        let result = match entry {
            LogEntry::SetMode { mode } => Ok(self.apply_set_mode(&mut state, index, mode)),
            LogEntry::Define {
                attributes,
                requesting_shard,
                implicit,
            } => self.apply_define(&mut state, index, attributes, requesting_shard, implicit),
            LogEntry::ExtendIndexes { attribute, indexes } => {
                Ok(self.apply_extend(&mut state, index, attribute, indexes))
            }
            LogEntry::DropAll => self.apply_drop_all(&mut state, index),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(reason) => return Err(self.halt(state, reason)),
        };

        state.applied_index = index;
        drop(state);

        {
            let mut outcomes = self.lock_outcomes();
            outcomes.insert(index, outcome.clone());
            while outcomes.len() > OUTCOME_RETENTION {
                outcomes.pop_first();
            }
        }
        self.metrics.increment_entries_applied();
        self.progress.send_modify(|progress| progress.applied = index);
        Ok(outcome)
    }

    fn halt(&self, mut state: RwLockWriteGuard<'_, AppliedState>, reason: HaltReason) -> HaltReason {
        state.halted = Some(reason);
        drop(state);

        let replica = self.replica_id.to_string();
        let shard = self.shard.to_string();
        let detail = reason.to_string();
        log_event(
            Event::ReplicaHalted,
            &[
                ("replica", replica.as_str()),
                ("shard", shard.as_str()),
                ("reason", detail.as_str()),
            ],
        );
        self.progress.send_modify(|progress| progress.halted = Some(reason));
        reason
    }

    fn log_applied(&self, event: Event, index: LogIndex, fields: &[(&str, &str)]) {
        // Every replica applies every entry; the shard leader speaks for the shard.
        if !self.is_shard_leader() {
            return;
        }
        let index = index.to_string();
        let shard = self.shard.to_string();
        let mut all: Vec<(&str, &str)> = vec![("index", index.as_str()), ("shard", shard.as_str())];
        all.extend_from_slice(fields);
        log_event(event, &all);
    }

    fn apply_set_mode(
        &self,
        state: &mut AppliedState,
        index: LogIndex,
        mode: ClusterMode,
    ) -> ApplyOutcome {
        state.mode = mode;
        self.log_applied(Event::ModeApplied, index, &[("mode", mode.as_str())]);
        ApplyOutcome::ModeSet { mode }
    }

    fn apply_define(
        &self,
        state: &mut AppliedState,
        index: LogIndex,
        attributes: Vec<NamedDefinition>,
        requesting_shard: ShardId,
        implicit: bool,
    ) -> Result<ApplyOutcome, HaltReason> {
        if !self.membership.contains(requesting_shard) {
            return Err(HaltReason::UnknownOwningShard {
                index,
                shard: requesting_shard,
            });
        }

        if !state.mode.allows_schema_changes() {
            return Ok(self.reject_define(index, RejectCause::ModeDisallow));
        }
        if implicit && !state.mode.allows_implicit_schema() {
            let missing = state
                .registry
                .missing(attributes.iter().map(|named| named.name.as_str()));
            if !missing.is_empty() {
                return Ok(self.reject_define(
                    index,
                    RejectCause::ImplicitInStrict {
                        attributes: missing,
                    },
                ));
            }
        }

        // Resolve against a working copy so the entry is all-or-nothing.
        let mut working = state.registry.clone();
        let mut entries = Vec::with_capacity(attributes.len());
        let mut created = Vec::new();
        let mut extended = Vec::new();
        for NamedDefinition { name, definition } in attributes {
            if let Err(reason) = definition.validate() {
                return Ok(self.reject_define(
                    index,
                    RejectCause::InvalidDefinition {
                        attribute: name,
                        reason,
                    },
                ));
            }
            match working.resolve_define(&name, &definition, requesting_shard, implicit) {
                DefineResolution::Create(entry) => {
                    working.insert(entry.clone());
                    created.push(name);
                    entries.push(entry);
                }
                DefineResolution::Existing(entry) => entries.push(entry),
                DefineResolution::Extend(entry) => {
                    working.insert(entry.clone());
                    extended.push(name);
                    entries.push(entry);
                }
                DefineResolution::Conflict(existing) => {
                    return Ok(self.reject_define(
                        index,
                        RejectCause::Conflict {
                            attribute: name,
                            committed: existing.definition,
                            proposed: definition,
                        },
                    ));
                }
            }
        }

        state.registry = working;
        for entry in entries.iter().filter(|entry| created.contains(&entry.name)) {
            let owner = entry.owning_shard.to_string();
            let definition = entry.definition.to_string();
            self.log_applied(
                Event::AttributeDefined,
                index,
                &[
                    ("attribute", entry.name.as_str()),
                    ("definition", definition.as_str()),
                    ("owner", owner.as_str()),
                ],
            );
        }
        for entry in entries.iter().filter(|entry| extended.contains(&entry.name)) {
            let version = entry.version.to_string();
            let definition = entry.definition.to_string();
            self.log_applied(
                Event::AttributeExtended,
                index,
                &[
                    ("attribute", entry.name.as_str()),
                    ("definition", definition.as_str()),
                    ("version", version.as_str()),
                ],
            );
        }
        Ok(ApplyOutcome::Defined { entries, created })
    }

    fn reject_define(&self, index: LogIndex, cause: RejectCause) -> ApplyOutcome {
        let event = match cause {
            RejectCause::Conflict { .. } => Event::DefineConflict,
            _ => Event::DefineRejected,
        };
        let detail = format!("{:?}", cause);
        self.log_applied(event, index, &[("cause", detail.as_str())]);
        ApplyOutcome::Rejected { cause }
    }

    fn apply_extend(
        &self,
        state: &mut AppliedState,
        index: LogIndex,
        attribute: String,
        indexes: BTreeSet<IndexKind>,
    ) -> ApplyOutcome {
        if !state.mode.allows_schema_changes() {
            return self.reject_define(index, RejectCause::ModeDisallow);
        }
        match state.registry.resolve_extend(&attribute, &indexes) {
            ExtendResolution::Extend(entry) => {
                state.registry.insert(entry.clone());
                let version = entry.version.to_string();
                let definition = entry.definition.to_string();
                self.log_applied(
                    Event::AttributeExtended,
                    index,
                    &[
                        ("attribute", attribute.as_str()),
                        ("definition", definition.as_str()),
                        ("version", version.as_str()),
                    ],
                );
                ApplyOutcome::Extended {
                    entry,
                    changed: true,
                }
            }
            ExtendResolution::Unchanged(entry) => ApplyOutcome::Extended {
                entry,
                changed: false,
            },
            ExtendResolution::Invalid(reason) => self.reject_define(
                index,
                RejectCause::InvalidDefinition { attribute, reason },
            ),
            ExtendResolution::Missing => {
                self.reject_define(index, RejectCause::MissingAttribute { attribute })
            }
        }
    }

    fn apply_drop_all(
        &self,
        state: &mut AppliedState,
        index: LogIndex,
    ) -> Result<ApplyOutcome, HaltReason> {
        if !state.mode.allows_schema_changes() {
            return Ok(self.reject_define(index, RejectCause::ModeDisallow));
        }

        state.registry.clear();

        // Shard data belongs to the leader's storage.
        let removed = if self.is_shard_leader() {
            self.storage
                .wipe(self.shard)
                .map_err(|_| HaltReason::WipeFailed {
                    index,
                    shard: self.shard,
                })?
        } else {
            0
        };

        let removed_str = removed.to_string();
        self.log_applied(Event::DropAllApplied, index, &[("removed", removed_str.as_str())]);
        Ok(ApplyOutcome::Dropped { removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{ObjectValue, Subject, Triple};
    use crate::schema::{AttributeDefinition, ValueType};
    use crate::storage::MemoryStorage;

    struct Fixture {
        replica: ReplicaState,
        storage: Arc<MemoryStorage>,
        next: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let leader = Uuid::new_v4();
            let mut membership = ShardMembership::new(1);
            membership.add_replica(ShardId::new(1), leader);
            membership.add_replica(ShardId::new(2), Uuid::new_v4());
            let storage = Arc::new(MemoryStorage::new());
            let replica = ReplicaState::new(
                leader,
                ShardId::new(1),
                Arc::new(membership),
                storage.clone(),
                Arc::new(MetricsRegistry::new()),
            );
            Self {
                replica,
                storage,
                next: 0,
            }
        }

        fn apply(&mut self, entry: LogEntry) -> ApplyOutcome {
            self.next += 1;
            self.replica
                .apply(CommittedEntry {
                    index: LogIndex::new(self.next),
                    entry,
                })
                .unwrap()
        }
    }

    fn define(name: &str, def: AttributeDefinition, shard: u32, implicit: bool) -> LogEntry {
        LogEntry::Define {
            attributes: vec![NamedDefinition::new(name, def)],
            requesting_shard: ShardId::new(shard),
            implicit,
        }
    }

    fn string_exact() -> AttributeDefinition {
        AttributeDefinition::new(ValueType::String).with_index(IndexKind::Exact)
    }

    #[test]
    fn test_starts_in_disallow_with_empty_registry() {
        let fixture = Fixture::new();
        assert_eq!(fixture.replica.mode(), ClusterMode::Disallow);
        assert!(fixture.replica.registry().is_empty());
        assert_eq!(fixture.replica.applied_index(), LogIndex::ZERO);
    }

    #[test]
    fn test_first_committer_wins() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });

        let first = fixture.apply(define("name", string_exact(), 1, false));
        match first {
            ApplyOutcome::Defined { created, .. } => assert_eq!(created, vec!["name".to_string()]),
            other => panic!("expected create, got {:?}", other),
        }

        let second = fixture.apply(define("name", AttributeDefinition::new(ValueType::Int), 2, false));
        match second {
            ApplyOutcome::Rejected {
                cause: RejectCause::Conflict { committed, .. },
            } => assert_eq!(committed, string_exact()),
            other => panic!("expected conflict, got {:?}", other),
        }

        let same = fixture.apply(define("name", string_exact(), 2, false));
        match same {
            ApplyOutcome::Defined { entries, created } => {
                assert!(created.is_empty());
                assert_eq!(entries[0].owning_shard, ShardId::new(1));
            }
            other => panic!("expected idempotent define, got {:?}", other),
        }
        assert_eq!(fixture.replica.registry().len(), 1);
    }

    #[test]
    fn test_multi_attribute_define_is_all_or_nothing() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        fixture.apply(define("age", AttributeDefinition::new(ValueType::Int), 1, false));

        let outcome = fixture.apply(LogEntry::Define {
            attributes: vec![
                NamedDefinition::new("name", string_exact()),
                NamedDefinition::new("age", AttributeDefinition::new(ValueType::Float)),
            ],
            requesting_shard: ShardId::new(1),
            implicit: false,
        });
        assert!(outcome.is_rejected());
        assert!(fixture.replica.lookup("name").is_none());
    }

    #[test]
    fn test_disallow_blocks_later_schema_entries() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        fixture.apply(define("name", string_exact(), 1, false));
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Disallow,
        });

        let outcome = fixture.apply(define("age", AttributeDefinition::new(ValueType::Int), 1, false));
        assert_eq!(
            outcome,
            ApplyOutcome::Rejected {
                cause: RejectCause::ModeDisallow
            }
        );
        assert!(fixture.apply(LogEntry::DropAll).is_rejected());
        // Earlier define survives the flip.
        assert!(fixture.replica.lookup("name").is_some());
    }

    #[test]
    fn test_implicit_define_rejected_in_strict() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        let outcome = fixture.apply(define("age", AttributeDefinition::new(ValueType::Int), 1, true));
        assert_eq!(
            outcome,
            ApplyOutcome::Rejected {
                cause: RejectCause::ImplicitInStrict {
                    attributes: vec!["age".into()]
                }
            }
        );
    }

    #[test]
    fn test_implicit_define_yields_to_existing_entry() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Unrestricted,
        });
        fixture.apply(define("name", string_exact(), 1, false));
        let outcome = fixture.apply(define("name", AttributeDefinition::new(ValueType::Default), 2, true));
        match outcome {
            ApplyOutcome::Defined { entries, created } => {
                assert!(created.is_empty());
                assert_eq!(entries[0].definition, string_exact());
            }
            other => panic!("expected existing entry, got {:?}", other),
        }
    }

    #[test]
    fn test_extend_indexes() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        fixture.apply(define("name", string_exact(), 1, false));
        let outcome = fixture.apply(LogEntry::ExtendIndexes {
            attribute: "name".into(),
            indexes: [IndexKind::Term].into_iter().collect(),
        });
        match outcome {
            ApplyOutcome::Extended { entry, changed } => {
                assert!(changed);
                assert_eq!(entry.version, 2);
            }
            other => panic!("expected extension, got {:?}", other),
        }

        let missing = fixture.apply(LogEntry::ExtendIndexes {
            attribute: "age".into(),
            indexes: [IndexKind::Int].into_iter().collect(),
        });
        assert!(missing.is_rejected());
    }

    #[test]
    fn test_define_with_added_index_extends_entry() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        fixture.apply(define("name", string_exact(), 1, false));

        let wider = string_exact().with_index(IndexKind::Term);
        match fixture.apply(define("name", wider.clone(), 2, false)) {
            ApplyOutcome::Defined { entries, created } => {
                assert!(created.is_empty());
                assert_eq!(entries[0].version, 2);
                assert_eq!(entries[0].owning_shard, ShardId::new(1));
            }
            other => panic!("expected extension, got {:?}", other),
        }
        assert_eq!(fixture.replica.lookup("name").unwrap().definition, wider);

        // Dropping an index back is still a conflict.
        let narrowed = fixture.apply(define("name", string_exact(), 1, false));
        assert!(matches!(
            narrowed,
            ApplyOutcome::Rejected {
                cause: RejectCause::Conflict { .. }
            }
        ));
        assert_eq!(fixture.replica.lookup("name").unwrap().version, 2);
    }

    #[test]
    fn test_drop_all_clears_registry_and_wipes_leader_shard() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Unrestricted,
        });
        fixture.apply(define("name", string_exact(), 1, false));
        fixture
            .storage
            .apply_data_change(
                ShardId::new(1),
                &[Triple::new(Subject::Uid(1), "name", ObjectValue::string("A"))],
                &[],
            )
            .unwrap();

        assert_eq!(fixture.apply(LogEntry::DropAll), ApplyOutcome::Dropped { removed: 1 });
        assert!(fixture.replica.registry().is_empty());
        assert_eq!(fixture.storage.triple_count(ShardId::new(1)), 0);
    }

    #[test]
    fn test_gap_halts_replica() {
        let fixture = Fixture::new();
        let reason = fixture
            .replica
            .apply(CommittedEntry {
                index: LogIndex::new(2),
                entry: LogEntry::DropAll,
            })
            .unwrap_err();
        assert_eq!(
            reason,
            HaltReason::NonContiguousApply {
                expected: LogIndex::new(1),
                received: LogIndex::new(2),
            }
        );
        assert_eq!(fixture.replica.halted(), Some(reason));

        // Halted replicas refuse everything afterwards, even the right index.
        let again = fixture.replica.apply(CommittedEntry {
            index: LogIndex::new(1),
            entry: LogEntry::DropAll,
        });
        assert_eq!(again, Err(reason));
    }

    #[test]
    fn test_unknown_owning_shard_halts_replica() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        let result = fixture.replica.apply(CommittedEntry {
            index: LogIndex::new(2),
            entry: define("name", string_exact(), 9, false),
        });
        assert!(matches!(result, Err(HaltReason::UnknownOwningShard { .. })));
    }

    #[test]
    fn test_failed_wipe_halts_replica() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        fixture.storage.set_failing(ShardId::new(1), true);
        let result = fixture.replica.apply(CommittedEntry {
            index: LogIndex::new(2),
            entry: LogEntry::DropAll,
        });
        assert!(matches!(result, Err(HaltReason::WipeFailed { .. })));
    }

    #[tokio::test]
    async fn test_wait_applied_wakes_on_apply() {
        let mut fixture = Fixture::new();
        fixture.apply(LogEntry::SetMode {
            mode: ClusterMode::Strict,
        });
        fixture.replica.wait_applied(LogIndex::new(1)).await.unwrap();
        assert_eq!(
            fixture.replica.outcome(LogIndex::new(1)),
            Some(ApplyOutcome::ModeSet {
                mode: ClusterMode::Strict
            })
        );
    }
}
