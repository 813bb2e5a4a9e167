//! Schema Registry snapshot
//!
//! The registry is only ever changed by the replica's ordered apply path.
//! Everything else reads an immutable snapshot; cloning one is O(1) because
//! the entries live in a persistent map.

use std::collections::BTreeSet;

use im::OrdMap;

use super::types::{AttributeDefinition, AttributeSchema, IndexKind};
use crate::membership::ShardId;

/// How a define resolves against the committed registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefineResolution {
    /// Name is free; this entry will be created
    Create(AttributeSchema),
    /// Name exists with a matching definition (or the define was implicit)
    Existing(AttributeSchema),
    /// Name exists and the define only adds index kinds; carries the
    /// entry at its next version
    Extend(AttributeSchema),
    /// Name exists with a different definition
    Conflict(AttributeSchema),
}

/// How an index extension resolves against the committed registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendResolution {
    /// Entry gains the new indexes at the next version
    Extend(AttributeSchema),
    /// Every requested index is already present
    Unchanged(AttributeSchema),
    /// Requested kinds are not valid for the attribute's type
    Invalid(String),
    /// No such attribute
    Missing,
}

/// Set of committed attribute schemas, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRegistry {
    entries: OrdMap<String, AttributeSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the committed schema for an attribute.
    pub fn lookup(&self, name: &str) -> Option<&AttributeSchema> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Shard that owns an attribute, if defined
    pub fn owner_of(&self, name: &str) -> Option<ShardId> {
        self.lookup(name).map(|entry| entry.owning_shard)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.entries.values()
    }

    /// Names from `names` with no committed entry, deduplicated and sorted.
    pub fn missing<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing: BTreeSet<&str> = names
            .into_iter()
            .filter(|name| !self.contains(name))
            .collect();
        missing.into_iter().map(str::to_string).collect()
    }

    /// First-committer-wins resolution of a define.
    ///
    /// Implicit defines never conflict: an existing entry simply wins.
    /// An explicit define that restates the committed definition with more
    /// index kinds extends it; any other difference is a conflict.
    pub fn resolve_define(
        &self,
        name: &str,
        definition: &AttributeDefinition,
        requesting_shard: ShardId,
        implicit: bool,
    ) -> DefineResolution {
        match self.lookup(name) {
            None => DefineResolution::Create(AttributeSchema::created(
                name,
                definition.clone(),
                requesting_shard,
            )),
            Some(existing) if implicit || existing.definition == *definition => {
                DefineResolution::Existing(existing.clone())
            }
            Some(existing) if definition.adds_indexes_to(&existing.definition) => {
                let mut extended = existing.clone();
                extended.definition.indexes = definition.indexes.clone();
                extended.version += 1;
                DefineResolution::Extend(extended)
            }
            Some(existing) => DefineResolution::Conflict(existing.clone()),
        }
    }

    /// Resolution of an append-only index extension.
    pub fn resolve_extend(&self, name: &str, indexes: &BTreeSet<IndexKind>) -> ExtendResolution {
        let Some(existing) = self.lookup(name) else {
            return ExtendResolution::Missing;
        };
        if let Some(kind) = indexes
            .iter()
            .find(|kind| !kind.applies_to(existing.definition.value_type))
        {
            return ExtendResolution::Invalid(format!(
                "index '{}' is not valid for type {}",
                kind, existing.definition.value_type
            ));
        }
        if !existing.definition.is_extended_by(indexes) {
            return ExtendResolution::Unchanged(existing.clone());
        }

        let mut extended = existing.clone();
        extended.definition.indexes.extend(indexes.iter().copied());
        extended.version += 1;
        ExtendResolution::Extend(extended)
    }

    /// Stores an entry produced by a resolution step.
    pub(crate) fn insert(&mut self, entry: AttributeSchema) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries = OrdMap::new();
    }
}
