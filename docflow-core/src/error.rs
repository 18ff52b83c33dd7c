// src/error.rs
//! Error types for docflow
//!
//! Structural and configuration errors abort the current call. Rows that fail
//! a pipeline predicate are not errors and never surface here.

use thiserror::Error;

/// Result type alias for docflow operations
pub type Result<T> = std::result::Result<T, DocflowError>;

#[derive(Debug, Error)]
pub enum DocflowError {
    /// A path could not be traversed or written: a scalar sits where a
    /// container is required, or the path itself is malformed.
    #[error("Structural error: {0}")]
    Structural(String),

    /// An operator symbol that is not in the operator table
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// An operand of the wrong shape for its operator
    #[error("Invalid operand: {0}")]
    InvalidOperand(String),

    /// A pipeline configuration that cannot be evaluated
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocflowError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        DocflowError::Structural(msg.into())
    }

    pub(crate) fn pipeline(msg: impl Into<String>) -> Self {
        DocflowError::InvalidPipeline(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_structural() {
        let err = DocflowError::structural("segment 'b' of 'a.b' is a scalar");
        let msg = err.to_string();
        assert!(msg.contains("Structural error"));
        assert!(msg.contains("a.b"));
    }

    #[test]
    fn test_error_display_unknown_operator() {
        let err = DocflowError::UnknownOperator("~=".to_string());
        assert_eq!(err.to_string(), "Unknown operator: ~=");
    }

    #[test]
    fn test_error_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DocflowError = parse_err.into();
        assert!(matches!(err, DocflowError::Serialization(_)));
    }
}
