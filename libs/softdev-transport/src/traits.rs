//! Transport collaborator contract
//!
//! The record runtime only needs a transport that can register a named
//! variable with get/put handlers, push change notifications and revoke
//! the registration. Wire details stay behind this seam.

use crate::error::{RemoteError, Result};
use async_trait::async_trait;
use softdev_fields::{FieldValue, Severity};
use std::fmt;
use std::sync::Arc;

/// Registration handle issued by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PvHandle(pub u64);

impl fmt::Display for PvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value and severity read together
#[derive(Debug, Clone, PartialEq)]
pub struct PvSnapshot {
    pub value: FieldValue,
    pub severity: Severity,
}

/// Server-side hooks of one published variable
///
/// Transports may call these from any task; implementations are
/// responsible for moving work onto their own execution context.
#[async_trait]
pub trait PvHandler: Send + Sync + 'static {
    /// Current value, never blocks
    fn remote_get(&self) -> std::result::Result<PvSnapshot, RemoteError>;

    /// Proposed value from a remote peer; `Err` is reported to the peer
    async fn remote_put(&self, value: FieldValue) -> std::result::Result<(), RemoteError>;
}

/// Network side of published variables
///
/// Implementations:
/// - `MemoryTransport`: in-process registry for tests and embedding
/// - `TcpTransport`: the same registry served over a TCP line protocol
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish `name` with its handler; names are unique per transport
    async fn register(&self, name: &str, handler: Arc<dyn PvHandler>) -> Result<PvHandle>;

    /// Revoke a registration; monitors of the variable end
    async fn unregister(&self, handle: PvHandle) -> Result<()>;

    /// Push a value change to remote subscribers
    ///
    /// Called on the event loop, so it must not block.
    fn notify(&self, handle: PvHandle, value: &FieldValue, severity: Severity);

    /// Deliver any pending notifications of `handle`
    async fn flush(&self, handle: PvHandle) -> Result<()> {
        let _ = handle;
        Ok(())
    }
}
