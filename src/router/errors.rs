//! Routing errors
//!
//! Failures are network-shaped. Ownership is never reassigned on failure:
//! an unreachable owner is reported, not routed around.

use thiserror::Error;

use crate::membership::ShardId;

/// Result type for routing
pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("{shard} unreachable: {reason}")]
    Unreachable { shard: ShardId, reason: String },

    /// No answer in time; the write may or may not have been applied
    #[error("{shard} did not answer within {waited_ms}ms")]
    Timeout { shard: ShardId, waited_ms: u64 },

    #[error("{shard} rejected the write: {reason}")]
    Rejected { shard: ShardId, reason: String },

    #[error("predicate {0} has no owning shard")]
    NoOwner(String),

    #[error("write for {received} delivered to {expected}")]
    WrongShard { expected: ShardId, received: ShardId },
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        match self {
            RoutingError::Unreachable { .. } => "ROUTING_UNREACHABLE",
            RoutingError::Timeout { .. } => "ROUTING_TIMEOUT",
            RoutingError::Rejected { .. } => "ROUTING_REJECTED",
            RoutingError::NoOwner(_) => "ROUTING_NO_OWNER",
            RoutingError::WrongShard { .. } => "ROUTING_WRONG_SHARD",
        }
    }

    /// Transient: retry with the same request id
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RoutingError::Unreachable { .. } | RoutingError::Timeout { .. }
        )
    }

    /// The owning shard may have applied the write
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, RoutingError::Timeout { .. })
    }
}
