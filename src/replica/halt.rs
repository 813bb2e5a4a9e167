//! Replica halt reasons
//!
//! A halted replica has detected that its locally applied state can no
//! longer be trusted. It stops serving and never resumes on its own; it has
//! to be rebuilt from the log.

use std::fmt;

use serde::Serialize;

use crate::consensus::LogIndex;
use crate::membership::ShardId;

/// Reason a replica stopped serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    /// Entries arrived out of order or with a gap
    NonContiguousApply { expected: LogIndex, received: LogIndex },

    /// A committed entry assigns ownership to a shard outside the membership table
    UnknownOwningShard { index: LogIndex, shard: ShardId },

    /// Registry was cleared but this shard's data could not be wiped
    WipeFailed { index: LogIndex, shard: ShardId },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::NonContiguousApply { expected, received } => write!(
                f,
                "expected log index {} but received {}",
                expected, received
            ),
            HaltReason::UnknownOwningShard { index, shard } => write!(
                f,
                "log index {} names {} which is not in the membership table",
                index, shard
            ),
            HaltReason::WipeFailed { index, shard } => write!(
                f,
                "drop-all at log index {} could not wipe {}",
                index, shard
            ),
        }
    }
}
