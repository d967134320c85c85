//! Evaluation error types.

use thiserror::Error;

/// Result type for formula evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Errors a formula evaluation can fail with. Evaluation is atomic: no
/// partial result is produced alongside an error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    /// Referenced identifier has no cell (outside the grid).
    #[error("Cell {0} not found")]
    CellNotFound(String),

    /// Cell value cannot coerce to a number where one is required.
    #[error("Cell {0} does not contain a number")]
    NotNumeric(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Aggregate found no numeric members.
    #[error("No numeric cells in range")]
    EmptyRange,

    #[error("Error evaluating formula: {0}")]
    ExpressionError(String),
}

impl EvalError {
    pub(crate) fn expression(message: impl Into<String>) -> EvalError {
        EvalError::ExpressionError(message.into())
    }
}
