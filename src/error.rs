//! Errors that can abort an assembly
//!
//! Everything recoverable (bad ratings, provider failures after the word list,
//! coincident points) is absorbed where it is detected. Only the variants here
//! ever reach the controller.

use thiserror::Error;

use crate::matrix::MatrixError;
use crate::provider::ProviderError;

/// Errors that prevent an assembly from starting or completing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    /// The question was rejected before any phase started
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider failed while generating the word list
    #[error("provider failure: {0}")]
    ProviderFailure(#[from] ProviderError),

    /// The word list response contained nothing usable
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A distance table violated its invariants
    #[error("invalid distance matrix: {0}")]
    InvalidMatrix(#[from] MatrixError),

    /// Words, weights and positions disagree in length
    #[error("inconsistent assembly space: {0}")]
    InvalidSpace(String),
}

/// Result type for assembly operations
pub type AssemblyResult<T> = Result<T, AssemblyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_provider_errors() {
        let err: AssemblyError = ProviderError::Timeout.into();
        assert_eq!(err.to_string(), "provider failure: provider timed out");
    }

    #[test]
    fn invalid_input_display() {
        let err = AssemblyError::InvalidInput("empty question".to_string());
        assert_eq!(err.to_string(), "invalid input: empty question");
    }
}
