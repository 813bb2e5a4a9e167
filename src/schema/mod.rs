//! Schema
//!
//! - `AttributeDefinition` / `AttributeSchema`: what an attribute is and who owns it
//! - `parse_schema`: Alter schema text into named definitions
//! - `SchemaRegistry`: immutable snapshot of committed entries
//! - `SchemaMutator`: define, extend and drop-all through the consensus log
//!
//! Names are created first-committer-wins; the owner never changes.

mod errors;
mod mutator;
mod parser;
mod registry;
mod types;

pub use errors::{SchemaError, SchemaResult};
pub use mutator::SchemaMutator;
pub use parser::{is_valid_attribute_name, parse_schema};
pub use registry::{DefineResolution, ExtendResolution, SchemaRegistry};
pub use types::{
    AttributeDefinition, AttributeSchema, IndexKind, NamedDefinition, ValueType,
};
