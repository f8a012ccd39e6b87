//! Transport error types

use crate::traits::PvHandle;
use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors of the server-side registration contract
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Variable already registered: {0}")]
    DuplicateName(String),

    #[error("Unknown handle: {0}")]
    UnknownHandle(PvHandle),

    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Outcome of a remote get/put as seen by the remote peer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    /// No variable of that name is registered
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record refused the value
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The record exists but can no longer process requests
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Malformed request or reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        RemoteError::Io(err.to_string())
    }
}

impl From<tokio_util::codec::LinesCodecError> for RemoteError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => RemoteError::Io(e.to_string()),
            other => RemoteError::Protocol(other.to_string()),
        }
    }
}

// Helper methods
impl RemoteError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        RemoteError::Rejected(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        RemoteError::Protocol(msg.into())
    }
}
