//! Error types for shared helpers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for CommonError {
    fn from(err: figment::Error) -> Self {
        CommonError::Config(err.to_string())
    }
}

// Helper methods
impl CommonError {
    pub fn config(msg: impl Into<String>) -> Self {
        CommonError::Config(msg.into())
    }

    pub fn logging(msg: impl Into<String>) -> Self {
        CommonError::Logging(msg.into())
    }
}
