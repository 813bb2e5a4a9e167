//! Cluster admission mode
//!
//! `ClusterMode` is the value; `ModeStore` is its replicated, log-backed
//! home on one replica.

mod store;
mod types;

pub use store::ModeStore;
pub use types::ClusterMode;
