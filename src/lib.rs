//! graphgate - write-path admission gate for a sharded graph store
//!
//! Every schema change and data mutation passes through one gate before it
//! reaches storage:
//!
//! - `mode`: cluster-wide disallow / strict / allow, changed through the log
//! - `schema`: the replicated attribute registry and the Schema Mutator
//! - `gate`: the admission policy table
//! - `router`: delivery of admitted data to the owning shards
//! - `replica`: the single ordered apply path every replica runs
//!
//! `consensus` is the seam to the ordered commit primitive; `cluster` wires
//! an in-process cluster on top of `MemoryLog` for the CLI and tests.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod gate;
pub mod membership;
pub mod mode;
pub mod mutation;
pub mod node;
pub mod observability;
pub mod replica;
pub mod router;
pub mod schema;
pub mod storage;

pub use cluster::{Cluster, ClusterError};
pub use config::ClusterConfig;
pub use errors::{GateError, GateResult};
pub use mode::ClusterMode;
pub use node::{AlterResponse, Mutation, MutationResponse, Node, Operation};
