//! Results of applying committed entries
//!
//! Every replica computes the same outcome for the same log index, so the
//! proposer can read it from its own replica once the entry is applied.

use serde::Serialize;

use crate::mode::ClusterMode;
use crate::schema::{AttributeDefinition, AttributeSchema};

/// What one committed entry did to the applied state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    ModeSet {
        mode: ClusterMode,
    },

    /// Entries for every requested name, in request order
    Defined {
        entries: Vec<AttributeSchema>,
        /// Names this entry created (the rest already existed)
        created: Vec<String>,
    },

    Extended {
        entry: AttributeSchema,
        changed: bool,
    },

    /// Registry cleared. `removed` counts triples wiped on this replica's shard.
    Dropped {
        removed: usize,
    },

    /// Entry committed but had no effect
    Rejected {
        cause: RejectCause,
    },
}

impl ApplyOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ApplyOutcome::Rejected { .. })
    }
}

/// Why a committed entry was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum RejectCause {
    /// Committed after the cluster switched to disallow
    ModeDisallow,

    /// Implicit define committed while the cluster was strict
    ImplicitInStrict { attributes: Vec<String> },

    /// A name was already defined differently
    Conflict {
        attribute: String,
        committed: AttributeDefinition,
        proposed: AttributeDefinition,
    },

    MissingAttribute { attribute: String },

    InvalidDefinition { attribute: String, reason: String },
}
