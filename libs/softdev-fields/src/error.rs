//! Field Definition Error Types

use softdev_calc::CalcError;
use thiserror::Error;

/// Result type for field definition
pub type Result<T> = std::result::Result<T, FieldError>;

/// Errors raised while defining a field
///
/// Every variant is a definition-time failure: a model using such a field
/// never starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldError {
    /// Field, device, or link name violates naming rules
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Same field name declared twice in one schema
    #[error("Duplicate field name: {0}")]
    Duplicate(String),

    /// A property is inconsistent (empty choices, inverted range, ...)
    #[error("Field '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// Builder option used on a kind it does not apply to
    #[error("Field '{field}': option '{option}' does not apply to {kind} fields")]
    NotApplicable {
        field: String,
        option: &'static str,
        kind: &'static str,
    },

    /// Default value rejected by the field's own constraints
    #[error("Field '{field}': invalid default: {reason}")]
    InvalidDefault { field: String, reason: String },

    /// Calc expression failed to compile
    #[error("Field '{field}': {source}")]
    Expression {
        field: String,
        #[source]
        source: CalcError,
    },

    /// Expression references an operand with no input binding
    #[error("Field '{field}': operand {letter} has no input binding")]
    UnboundOperand { field: String, letter: char },

    /// Input or output link text could not be parsed
    #[error("Field '{field}': invalid link '{link}': {reason}")]
    InvalidLink {
        field: String,
        link: String,
        reason: String,
    },
}

// Helper methods
impl FieldError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FieldError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_default(field: impl Into<String>, reason: impl ToString) -> Self {
        FieldError::InvalidDefault {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_link(
        field: impl Into<String>,
        link: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FieldError::InvalidLink {
            field: field.into(),
            link: link.into(),
            reason: reason.into(),
        }
    }
}
