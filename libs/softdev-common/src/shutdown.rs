//! Shutdown signal handling

use tracing::{info, warn};

/// Signal that ended [`wait_for_shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Wait for Ctrl+C, or SIGTERM on Unix
///
/// ```ignore
/// tokio::select! {
///     signal = softdev_common::shutdown::wait_for_shutdown() => { ... }
///     _ = server => {}
/// }
/// ```
pub async fn wait_for_shutdown() -> ShutdownSignal {
    #[cfg(unix)]
    let signal = {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
                    _ = term.recv() => ShutdownSignal::Terminate,
                }
            },
            Err(e) => {
                warn!("SIGTERM handler unavailable, only Ctrl+C stops the IOC: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                ShutdownSignal::Interrupt
            },
        }
    };
    #[cfg(not(unix))]
    let signal = {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownSignal::Interrupt
    };

    info!(?signal, "Shutdown signal received");
    signal
}
