//! Schema error types
//!
//! Error codes:
//! - SCHEMA_PARSE_FAILED (REJECT)
//! - SCHEMA_INVALID_DEFINITION (REJECT)
//! - SCHEMA_DUPLICATE_ATTRIBUTE (REJECT)
//! - SCHEMA_CONFLICT (REJECT)
//! - SCHEMA_UNKNOWN_ATTRIBUTE (REJECT)

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid schema at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid definition for predicate {attribute}: {reason}")]
    InvalidDefinition { attribute: String, reason: String },

    #[error("predicate {0} is declared more than once with different definitions")]
    DuplicateAttribute(String),

    #[error("schema conflict for predicate {attribute}: committed `{committed}`, proposed `{proposed}`")]
    Conflict {
        attribute: String,
        committed: String,
        proposed: String,
    },

    #[error("schema not defined for predicate: {0}")]
    UnknownAttribute(String),
}

impl SchemaError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        SchemaError::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn invalid_definition(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidDefinition {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::Parse { .. } => "SCHEMA_PARSE_FAILED",
            SchemaError::InvalidDefinition { .. } => "SCHEMA_INVALID_DEFINITION",
            SchemaError::DuplicateAttribute(_) => "SCHEMA_DUPLICATE_ATTRIBUTE",
            SchemaError::Conflict { .. } => "SCHEMA_CONFLICT",
            SchemaError::UnknownAttribute(_) => "SCHEMA_UNKNOWN_ATTRIBUTE",
        }
    }
}
