//! Data mutations
//!
//! Parses Mutate request bodies (N-Quads) into a `DataChange`, the batch the
//! admission gate inspects and the router splits across owning shards.

mod errors;
mod nquad;
mod types;

pub use errors::{MutationError, MutationResult};
pub use nquad::{parse_delete_nquads, parse_set_nquads};
pub use types::{DataChange, ObjectValue, Subject, Triple};
