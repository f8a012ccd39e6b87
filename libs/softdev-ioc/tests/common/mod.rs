//! Shared helpers for runtime integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)]

use softdev_ioc::Ioc;
use softdev_transport::MemoryTransport;
use std::sync::Arc;

/// Runtime over an in-memory transport with its event loop running
///
/// Must be called inside a tokio runtime.
pub fn runtime() -> (Ioc, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let (ioc, event_loop) = Ioc::with_event_loop(transport.clone());
    event_loop.spawn();
    (ioc, transport)
}

/// Drain `levels` generations of posted jobs
pub async fn settle(ioc: &Ioc, levels: usize) {
    for _ in 0..levels {
        ioc.barrier().await.unwrap();
    }
}
