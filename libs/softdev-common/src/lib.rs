//! Softdev Common Helpers
//!
//! # Modules
//!
//! - `logging`: tracing subscriber setup with runtime filter changes
//! - `config`: layered configuration (files + `SOFTDEV_` environment)
//! - `shutdown`: Ctrl+C / SIGTERM handling

pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use config::{load_config, ModelConfig, ServerConfig, SoftdevConfig};
pub use error::{CommonError, Result};
pub use logging::LogConfig;
pub use shutdown::{wait_for_shutdown, ShutdownSignal};
