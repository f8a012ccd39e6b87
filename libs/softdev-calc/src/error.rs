//! Error types for softdev-calc

use crate::{MAX_EXPRESSION_LENGTH, MAX_NESTING_DEPTH};
use thiserror::Error;

/// Calculation errors
///
/// Parse-time variants (`Syntax`, `TooLong`, `TooDeep`) are raised when an
/// expression is compiled; the rest come out of [`crate::Expression::evaluate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Expression too long: {0} > {MAX_EXPRESSION_LENGTH} characters")]
    TooLong(usize),

    #[error("Expression nesting too deep: more than {MAX_NESTING_DEPTH} levels")]
    TooDeep,

    #[error("Input {0} is not available")]
    MissingInput(char),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Expression did not evaluate to a finite number")]
    NonFinite,
}

impl CalcError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Whether the error was produced while compiling rather than evaluating
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            CalcError::Syntax { .. } | CalcError::TooLong(_) | CalcError::TooDeep
        )
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
