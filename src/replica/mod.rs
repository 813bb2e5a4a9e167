//! Replica
//!
//! Each replica holds a read-only copy of the cluster-wide mode and schema
//! registry, rebuilt by applying the consensus log in order.
//!
//! - `ReplicaState`: applied state and the single ordered apply path
//! - `spawn_applier`: task feeding committed entries into `apply`
//! - `Proposer`: submit an entry and wait for its local outcome
//! - `HaltReason`: local faults that stop a replica for good

mod applier;
mod halt;
mod outcome;
mod proposer;
mod state;

pub use applier::spawn_applier;
pub use halt::HaltReason;
pub use outcome::{ApplyOutcome, RejectCause};
pub use proposer::Proposer;
pub use state::{ReplicaSnapshot, ReplicaState};
