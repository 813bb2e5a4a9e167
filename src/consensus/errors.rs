//! Consensus error types

use thiserror::Error;

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Failures of the consensus primitive.
///
/// None of these say whether a proposal committed: after any of them the
/// caller re-reads local state before retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("consensus unavailable: {0}")]
    Unavailable(String),

    #[error("proposal rejected by consensus: {0}")]
    Rejected(String),

    #[error("consensus log closed")]
    Closed,
}

impl ConsensusError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ConsensusError::Unavailable(_) => "CONSENSUS_UNAVAILABLE",
            ConsensusError::Rejected(_) => "CONSENSUS_REJECTED",
            ConsensusError::Closed => "CONSENSUS_CLOSED",
        }
    }
}
