//! In-memory storage engine

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::errors::{StorageError, StorageResult};
use super::StorageEngine;
use crate::membership::ShardId;
use crate::mutation::Triple;

#[derive(Debug, Default)]
struct StorageInner {
    shards: BTreeMap<ShardId, Vec<Triple>>,
    failing: BTreeSet<ShardId>,
    wipes: u64,
}

/// Triples per shard, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<StorageInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every write to `shard` fail until cleared
    pub fn set_failing(&self, shard: ShardId, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing.insert(shard);
        } else {
            inner.failing.remove(&shard);
        }
    }

    pub fn triple_count(&self, shard: ShardId) -> usize {
        self.lock().shards.get(&shard).map_or(0, Vec::len)
    }

    /// Number of triples on `shard` with the given predicate
    pub fn count_predicate(&self, shard: ShardId, predicate: &str) -> usize {
        self.lock()
            .shards
            .get(&shard)
            .map_or(0, |triples| {
                triples.iter().filter(|t| t.predicate == predicate).count()
            })
    }

    pub fn triples(&self, shard: ShardId) -> Vec<Triple> {
        self.lock().shards.get(&shard).cloned().unwrap_or_default()
    }

    /// Total wipe calls across all shards
    pub fn wipe_count(&self) -> u64 {
        self.lock().wipes
    }
}

impl StorageEngine for MemoryStorage {
    fn apply_data_change(
        &self,
        shard: ShardId,
        set: &[Triple],
        delete: &[Triple],
    ) -> StorageResult<usize> {
        let mut inner = self.lock();
        if inner.failing.contains(&shard) {
            return Err(StorageError::WriteFailed {
                shard,
                reason: "injected failure".into(),
            });
        }

        let triples = inner.shards.entry(shard).or_default();
        triples.retain(|stored| !delete.iter().any(|pattern| pattern.matches(stored)));
        for triple in set {
            if !triples.contains(triple) {
                triples.push(triple.clone());
            }
        }
        Ok(set.len())
    }

    fn wipe(&self, shard: ShardId) -> StorageResult<usize> {
        let mut inner = self.lock();
        if inner.failing.contains(&shard) {
            return Err(StorageError::WipeFailed {
                shard,
                reason: "injected failure".into(),
            });
        }
        inner.wipes += 1;
        Ok(inner.shards.remove(&shard).map_or(0, |triples| triples.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{ObjectValue, Subject};

    fn name(uid: u64, value: &str) -> Triple {
        Triple::new(Subject::Uid(uid), "name", ObjectValue::string(value))
    }

    #[test]
    fn test_set_then_delete() {
        let storage = MemoryStorage::new();
        let shard = ShardId::new(1);

        storage
            .apply_data_change(shard, &[name(1, "Alice"), name(2, "Bob")], &[])
            .unwrap();
        assert_eq!(storage.triple_count(shard), 2);

        let wildcard = Triple::new(Subject::Uid(1), "name", ObjectValue::Wildcard);
        storage.apply_data_change(shard, &[], &[wildcard]).unwrap();
        assert_eq!(storage.triples(shard), vec![name(2, "Bob")]);
    }

    #[test]
    fn test_duplicate_set_is_stored_once() {
        let storage = MemoryStorage::new();
        let shard = ShardId::new(1);
        storage.apply_data_change(shard, &[name(1, "Alice")], &[]).unwrap();
        storage.apply_data_change(shard, &[name(1, "Alice")], &[]).unwrap();
        assert_eq!(storage.count_predicate(shard, "name"), 1);
    }

    #[test]
    fn test_wipe_is_per_shard() {
        let storage = MemoryStorage::new();
        storage.apply_data_change(ShardId::new(1), &[name(1, "A")], &[]).unwrap();
        storage.apply_data_change(ShardId::new(2), &[name(2, "B")], &[]).unwrap();

        assert_eq!(storage.wipe(ShardId::new(1)).unwrap(), 1);
        assert_eq!(storage.triple_count(ShardId::new(1)), 0);
        assert_eq!(storage.triple_count(ShardId::new(2)), 1);
        assert_eq!(storage.wipe_count(), 1);
    }

    #[test]
    fn test_injected_failure_writes_nothing() {
        let storage = MemoryStorage::new();
        let shard = ShardId::new(3);
        storage.set_failing(shard, true);
        let err = storage.apply_data_change(shard, &[name(1, "A")], &[]).unwrap_err();
        assert_eq!(err.code(), "STORAGE_WRITE_FAILED");
        assert_eq!(storage.triple_count(shard), 0);

        storage.set_failing(shard, false);
        assert!(storage.apply_data_change(shard, &[name(1, "A")], &[]).is_ok());
    }
}
