//! Mutation parsing errors

use thiserror::Error;

/// Result type for mutation parsing
pub type MutationResult<T> = Result<T, MutationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("invalid N-Quad at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("empty mutation")]
    Empty,
}

impl MutationError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        MutationError::Parse {
            line,
            message: message.into(),
        }
    }
}
