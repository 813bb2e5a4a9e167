//! Admission gate
//!
//! Called on the receiving replica before any effect. `decide` only looks
//! at the request, the applied mode and a registry snapshot; the node acts
//! on its answer.

mod decision;
mod request;

pub use decision::{decide, AdmissionDecision, RejectReason};
pub use request::{MutationRequest, SchemaChange};
