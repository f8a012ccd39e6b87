//! Softdev Transport Abstraction
//!
//! The seam between the record runtime and the network.
//!
//! # Key Components
//!
//! - **Transport trait**: register / unregister / notify / flush
//! - **PvHandler trait**: remote get/put hooks supplied per variable
//! - **MemoryTransport**: in-process registry with simulated remote peers
//! - **TcpTransport / TcpClient**: line protocol over TCP

pub mod error;

pub mod memory_impl;

pub mod tcp_impl;

pub mod traits;

// Re-exports
pub use error::{RemoteError, Result, TransportError};
pub use memory_impl::{MemoryStats, MemoryTransport, Notification};
pub use tcp_impl::{Monitor, TcpClient, TcpTransport};
pub use traits::{PvHandle, PvHandler, PvSnapshot, Transport};
