//! Runtime error types

use softdev_fields::FieldError;
use softdev_transport::TransportError;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, IocError>;

/// Runtime errors
///
/// Rejected puts and failed calc evaluations are not errors: the first is
/// reported as `false` from a put, the second as INVALID severity.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IocError {
    /// Schema or descriptor misconfiguration, fatal to model start
    #[error("Definition error: {0}")]
    Definition(#[from] FieldError),

    /// Published name already taken by another record
    #[error("Variable name already in use: {0}")]
    DuplicateName(String),

    /// No field of that name in the model
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Operation attempted or pending during or after teardown
    #[error("Shut down: {0}")]
    Shutdown(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

// Helper methods
impl IocError {
    pub fn shutdown(name: impl Into<String>) -> Self {
        IocError::Shutdown(name.into())
    }

    pub fn unknown_field(name: impl Into<String>) -> Self {
        IocError::UnknownField(name.into())
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, IocError::Shutdown(_))
    }
}
