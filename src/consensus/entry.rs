//! Configuration log entries
//!
//! Mode changes and registry changes share one log, so every replica sees
//! them interleaved in the same total order.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::membership::ShardId;
use crate::mode::ClusterMode;
use crate::schema::{IndexKind, NamedDefinition};

/// Position of a committed entry in the log. The first entry is index 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogIndex(u64);

impl LogIndex {
    /// Index before any entry was committed
    pub const ZERO: LogIndex = LogIndex(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The index that must be applied after this one
    pub fn next(&self) -> LogIndex {
        LogIndex(self.0 + 1)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configuration change proposed through consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    /// Switch the cluster admission mode
    SetMode { mode: ClusterMode },

    /// Define one or more attributes as a single all-or-nothing change.
    ///
    /// `implicit` marks definitions inferred from an Unrestricted-mode
    /// data mutation; those resolve to any existing entry instead of
    /// conflicting with it.
    Define {
        attributes: Vec<NamedDefinition>,
        requesting_shard: ShardId,
        implicit: bool,
    },

    /// Append index kinds to an existing attribute
    ExtendIndexes {
        attribute: String,
        indexes: BTreeSet<IndexKind>,
    },

    /// Clear the registry and wipe every shard's data
    DropAll,
}

impl LogEntry {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::SetMode { .. } => "set_mode",
            LogEntry::Define { .. } => "define",
            LogEntry::ExtendIndexes { .. } => "extend_indexes",
            LogEntry::DropAll => "drop_all",
        }
    }
}

/// An entry together with the index consensus assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEntry {
    pub index: LogIndex,
    pub entry: LogEntry,
}
