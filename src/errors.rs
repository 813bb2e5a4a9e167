//! Request-boundary error taxonomy
//!
//! Every failure of an Alter or Mutate surfaces as a `GateError`. None of
//! them take the serving replica down except `Halted`, which reports a
//! replica that already stopped because its applied state is corrupt.
//!
//! | Error | Retry |
//! |---|---|
//! | ModeRejection | later, or after a mode change |
//! | SchemaConflict | never automatically |
//! | UnknownAttribute | after defining the attribute |
//! | ConsensusTimeout / ConsensusUnavailable | after re-reading state |
//! | RoutingFailure | yes, with the same request id |

use thiserror::Error;

use crate::consensus::{ConsensusError, LogIndex};
use crate::mutation::MutationError;
use crate::replica::{HaltReason, RejectCause};
use crate::router::RoutingError;
use crate::schema::SchemaError;

/// Message returned for every request rejected in disallow mode
pub const NO_MUTATIONS_ALLOWED: &str = "no mutations allowed";

/// Message prefix for data mutations on undefined attributes in strict mode
pub const SCHEMA_NOT_DEFINED: &str = "schema not defined for predicate";

/// Result type at the request boundary
pub type GateResult<T> = Result<T, GateError>;

/// Structured rejection returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("no mutations allowed")]
    ModeRejection,

    #[error("schema conflict for predicate {attribute}: committed `{committed}`, proposed `{proposed}`")]
    SchemaConflict {
        attribute: String,
        committed: String,
        proposed: String,
    },

    #[error("schema not defined for predicate: {}", .attributes.join(", "))]
    UnknownAttribute { attributes: Vec<String> },

    #[error("proposal outcome unknown after {waited_ms}ms (log index {}); re-read state before retrying", .index.map(|i| i.to_string()).unwrap_or_else(|| "unassigned".into()))]
    ConsensusTimeout {
        index: Option<LogIndex>,
        waited_ms: u64,
    },

    #[error("consensus unavailable: {0}")]
    ConsensusUnavailable(String),

    #[error("routing failed: {0}")]
    RoutingFailure(#[from] RoutingError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("replica halted: {0}")]
    Halted(HaltReason),
}

impl GateError {
    pub fn unknown_attributes(attributes: Vec<String>) -> Self {
        GateError::UnknownAttribute { attributes }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        GateError::InvalidRequest(message.into())
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            GateError::ModeRejection => "MODE_REJECTION",
            GateError::SchemaConflict { .. } => "SCHEMA_CONFLICT",
            GateError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            GateError::ConsensusTimeout { .. } => "CONSENSUS_TIMEOUT",
            GateError::ConsensusUnavailable(_) => "CONSENSUS_UNAVAILABLE",
            GateError::RoutingFailure(_) => "ROUTING_FAILURE",
            GateError::InvalidRequest(_) => "INVALID_REQUEST",
            GateError::Halted(_) => "REPLICA_HALTED",
        }
    }

    /// Transient failures the caller may retry as-is
    pub fn is_retryable(&self) -> bool {
        match self {
            GateError::RoutingFailure(inner) => inner.is_retryable(),
            GateError::ConsensusUnavailable(_) => true,
            _ => false,
        }
    }

    /// Whether the outcome is unknown and state must be re-read first
    pub fn requires_state_check(&self) -> bool {
        match self {
            GateError::ConsensusTimeout { .. } | GateError::ConsensusUnavailable(_) => true,
            GateError::RoutingFailure(inner) => inner.outcome_unknown(),
            _ => false,
        }
    }

    /// Only a halted replica is fatal
    pub fn is_fatal(&self) -> bool {
        matches!(self, GateError::Halted(_))
    }
}

impl From<ConsensusError> for GateError {
    fn from(err: ConsensusError) -> Self {
        GateError::ConsensusUnavailable(err.to_string())
    }
}

impl From<SchemaError> for GateError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Conflict {
                attribute,
                committed,
                proposed,
            } => GateError::SchemaConflict {
                attribute,
                committed,
                proposed,
            },
            SchemaError::UnknownAttribute(attribute) => GateError::UnknownAttribute {
                attributes: vec![attribute],
            },
            other => GateError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<MutationError> for GateError {
    fn from(err: MutationError) -> Self {
        GateError::InvalidRequest(err.to_string())
    }
}

impl From<RejectCause> for GateError {
    fn from(cause: RejectCause) -> Self {
        match cause {
            RejectCause::ModeDisallow => GateError::ModeRejection,
            RejectCause::ImplicitInStrict { attributes } => GateError::UnknownAttribute { attributes },
            RejectCause::Conflict {
                attribute,
                committed,
                proposed,
            } => GateError::SchemaConflict {
                attribute,
                committed: committed.to_string(),
                proposed: proposed.to_string(),
            },
            RejectCause::MissingAttribute { attribute } => GateError::UnknownAttribute {
                attributes: vec![attribute],
            },
            RejectCause::InvalidDefinition { attribute, reason } => {
                GateError::InvalidRequest(format!("predicate {}: {}", attribute, reason))
            }
        }
    }
}

impl From<HaltReason> for GateError {
    fn from(reason: HaltReason) -> Self {
        GateError::Halted(reason)
    }
}
