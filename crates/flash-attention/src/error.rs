use thiserror::Error;

use crate::dtype::DType;

/// Result type of every fallible kernel operation.
pub type Result<T> = std::result::Result<T, AttentionError>;

/// Failure conditions of a single attention invocation.
///
/// Every variant terminates the call; no partial output is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttentionError {
    #[error("invalid shape for '{tensor}': expected {expected}, got {actual:?}")]
    InvalidShape {
        /// Name of the offending tensor (`q`, `k`, `v`, ...).
        tensor: &'static str,
        /// Human-readable description of the accepted shape.
        expected: String,
        /// Shape that was actually supplied.
        actual: Vec<usize>,
    },

    #[error("type mismatch for '{tensor}': expected {expected}, got {actual}")]
    TypeMismatch {
        tensor: &'static str,
        expected: DType,
        actual: DType,
    },

    #[error("failed to allocate tensor of shape {shape:?} ({element_size}-byte elements)")]
    AllocationFailure {
        shape: Vec<usize>,
        element_size: usize,
    },
}

impl AttentionError {
    pub(crate) fn invalid_shape(
        tensor: &'static str,
        expected: impl Into<String>,
        actual: &[usize],
    ) -> Self {
        Self::InvalidShape {
            tensor,
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }
}
