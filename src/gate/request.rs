//! Requests as the admission gate sees them

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::mutation::DataChange;
use crate::schema::{IndexKind, NamedDefinition};

/// Change to the schema registry (Alter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaChange {
    /// Create attributes, all or nothing
    Define { definitions: Vec<NamedDefinition> },

    /// Append index kinds to an existing attribute
    ExtendIndexes {
        attribute: String,
        indexes: BTreeSet<IndexKind>,
    },

    /// Clear the registry and every shard's data
    DropAll,
}

impl SchemaChange {
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaChange::Define { .. } => "define",
            SchemaChange::ExtendIndexes { .. } => "extend_indexes",
            SchemaChange::DropAll => "drop_all",
        }
    }
}

/// A write arriving at a replica
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    Schema(SchemaChange),
    Data(DataChange),
}

impl MutationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            MutationRequest::Schema(change) => change.kind(),
            MutationRequest::Data(_) => "data",
        }
    }
}

impl From<SchemaChange> for MutationRequest {
    fn from(change: SchemaChange) -> Self {
        MutationRequest::Schema(change)
    }
}

impl From<DataChange> for MutationRequest {
    fn from(change: DataChange) -> Self {
        MutationRequest::Data(change)
    }
}
