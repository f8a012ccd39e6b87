//! TCP line-protocol transport
//!
//! Serves a [`MemoryTransport`] registry to remote peers. One request per
//! line, one task per connection:
//!
//! ```text
//! GET <name>               -> OK <value> <severity>
//! PUT <name> <value>       -> OK
//! MONITOR <name>           -> OK <value> <severity>, then
//!                             EVENT <name> <value> <severity> per change
//! anything failing         -> ERR <message>
//! ```
//!
//! Values use the `FieldValue` text form, so the severity is always the
//! last word of a reply.

use crate::error::{RemoteError, Result, TransportError};
use crate::memory_impl::{MemoryTransport, Notification};
use crate::traits::{PvHandle, PvHandler, PvSnapshot, Transport};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use softdev_fields::{FieldValue, Severity};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest accepted request or reply line
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

fn codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_LINE_LENGTH)
}

fn value_text(value: &FieldValue) -> String {
    value.to_string().replace(['\r', '\n'], " ")
}

fn snapshot_line(prefix: &str, snapshot: &PvSnapshot) -> String {
    format!(
        "{} {} {}",
        prefix,
        value_text(&snapshot.value),
        snapshot.severity
    )
}

fn event_line(event: &Notification) -> String {
    format!(
        "EVENT {} {} {}",
        event.name,
        value_text(&event.value),
        event.severity
    )
}

/// Split `"<value> <severity>"`
fn parse_snapshot(text: &str) -> std::result::Result<PvSnapshot, RemoteError> {
    let (value, severity) = text
        .rsplit_once(' ')
        .ok_or_else(|| RemoteError::protocol(format!("missing severity in '{}'", text)))?;
    Ok(PvSnapshot {
        value: FieldValue::parse_text(value),
        severity: severity.parse().map_err(RemoteError::protocol)?,
    })
}

/// Transport publishing records to TCP clients
pub struct TcpTransport {
    registry: Arc<MemoryTransport>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl TcpTransport {
    /// Bind the listener and start accepting connections
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(MemoryTransport::new());
        let cancel = CancellationToken::new();

        info!("Softdev transport listening on {}", local_addr);

        let accept_registry = Arc::clone(&registry);
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("New connection from {}", peer);
                            let registry = Arc::clone(&accept_registry);
                            let cancel = accept_cancel.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(registry, stream, cancel).await {
                                    debug!("Connection {} closed: {}", peer, e);
                                }
                            });
                        },
                        Err(e) => {
                            error!("Accept error: {}", e);
                            break;
                        },
                    },
                }
            }
            debug!("Accept loop stopped");
        });

        Ok(Self {
            registry,
            local_addr,
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registry behind the listener, for in-process access
    pub fn registry(&self) -> &MemoryTransport {
        &self.registry
    }

    /// Stop accepting and close every connection
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn register(&self, name: &str, handler: Arc<dyn PvHandler>) -> Result<PvHandle> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.registry.register(name, handler).await
    }

    async fn unregister(&self, handle: PvHandle) -> Result<()> {
        self.registry.unregister(handle).await
    }

    fn notify(&self, handle: PvHandle, value: &FieldValue, severity: Severity) {
        self.registry.notify(handle, value, severity);
    }

    async fn flush(&self, handle: PvHandle) -> Result<()> {
        self.registry.flush(handle).await
    }
}

async fn serve_connection(
    registry: Arc<MemoryTransport>,
    stream: TcpStream,
    cancel: CancellationToken,
) -> std::result::Result<(), RemoteError> {
    let (mut sink, mut lines) = Framed::new(stream, codec()).split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Replies and monitor events share one ordered outbound queue
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if let Err(e) = sink.send(line).await {
                debug!("Write error: {}", e);
                writer_cancel.cancel();
                break;
            }
        }
    });

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = lines.next() => match next {
                Some(line) => line?,
                None => break,
            },
        };
        if let Some(reply) = handle_request(&registry, line.trim(), &out_tx, &cancel).await {
            if out_tx.send(reply).is_err() {
                break;
            }
        }
    }

    cancel.cancel();
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// Answer one request line
///
/// Returns `None` when the reply was already queued (MONITOR queues its
/// reply itself so that no event can overtake it).
async fn handle_request(
    registry: &MemoryTransport,
    line: &str,
    out_tx: &mpsc::UnboundedSender<String>,
    cancel: &CancellationToken,
) -> Option<String> {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or_default().to_ascii_uppercase();
    let name = parts.next().unwrap_or_default();

    let result = match (command.as_str(), name) {
        (_, "") => Err(RemoteError::protocol(format!("malformed request '{}'", line))),
        ("GET", name) => registry
            .get(name)
            .map(|snapshot| snapshot_line("OK", &snapshot)),
        ("PUT", name) => match parts.next() {
            Some(text) => registry
                .put(name, FieldValue::parse_text(text))
                .await
                .map(|()| "OK".to_string()),
            None => Err(RemoteError::protocol("PUT needs a value")),
        },
        ("MONITOR", name) => {
            match start_monitor(registry, name, out_tx, cancel) {
                Ok(()) => return None,
                Err(e) => Err(e),
            }
        },
        (other, _) => Err(RemoteError::protocol(format!("unknown command '{}'", other))),
    };

    Some(match result {
        Ok(reply) => reply,
        Err(e) => {
            if matches!(e, RemoteError::Protocol(_)) {
                warn!("Bad request '{}': {}", line, e);
            }
            format!("ERR {}", e)
        },
    })
}

fn start_monitor(
    registry: &MemoryTransport,
    name: &str,
    out_tx: &mpsc::UnboundedSender<String>,
    cancel: &CancellationToken,
) -> std::result::Result<(), RemoteError> {
    // Subscribe before reading so no change falls between snapshot and events
    let mut events = registry.monitor(name)?;
    let snapshot = registry.get(name)?;
    if out_tx.send(snapshot_line("OK", &snapshot)).is_err() {
        return Ok(());
    }

    let out_tx = out_tx.clone();
    let cancel = cancel.clone();
    let name = name.to_string();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if out_tx.send(event_line(&event)).is_err() {
                            break;
                        }
                    },
                    None => break,
                },
            }
        }
        debug!(name = %name, "Monitor finished");
    });
    Ok(())
}

// ============================================================================
// Client
// ============================================================================

/// Client side of the line protocol
pub struct TcpClient {
    framed: Framed<TcpStream, LinesCodec>,
}

impl TcpClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> std::result::Result<Self, RemoteError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, codec()),
        })
    }

    async fn request(&mut self, line: String) -> std::result::Result<String, RemoteError> {
        self.framed.send(line).await?;
        loop {
            let reply = self
                .framed
                .next()
                .await
                .ok_or_else(|| RemoteError::Io("connection closed".to_string()))??;
            // Events of earlier monitors on this connection are skipped
            if reply.starts_with("EVENT ") {
                continue;
            }
            if let Some(message) = reply.strip_prefix("ERR ") {
                return Err(remote_error(message));
            }
            return match reply.strip_prefix("OK") {
                Some(rest) => Ok(rest.strip_prefix(' ').unwrap_or(rest).to_string()),
                None => Err(RemoteError::protocol(format!("unexpected reply '{}'", reply))),
            };
        }
    }

    pub async fn get(&mut self, name: &str) -> std::result::Result<PvSnapshot, RemoteError> {
        let rest = self.request(format!("GET {}", name)).await?;
        parse_snapshot(&rest)
    }

    pub async fn put(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> std::result::Result<(), RemoteError> {
        self.request(format!("PUT {} {}", name, value_text(value)))
            .await
            .map(|_| ())
    }

    /// Start monitoring `name`; the connection is dedicated to the monitor
    pub async fn monitor(mut self, name: &str) -> std::result::Result<Monitor, RemoteError> {
        let rest = self.request(format!("MONITOR {}", name)).await?;
        let initial = parse_snapshot(&rest)?;
        Ok(Monitor {
            framed: self.framed,
            initial,
        })
    }
}

/// Recover the error variant from its display text
fn remote_error(message: &str) -> RemoteError {
    let (kind, detail) = message.split_once(": ").unwrap_or(("", message));
    match kind {
        "Not found" => RemoteError::NotFound(detail.to_string()),
        "Rejected" => RemoteError::Rejected(detail.to_string()),
        "Unavailable" => RemoteError::Unavailable(detail.to_string()),
        _ => RemoteError::Protocol(message.to_string()),
    }
}

/// Stream of change events for one variable
pub struct Monitor {
    framed: Framed<TcpStream, LinesCodec>,
    /// Value at the time the monitor was set up
    pub initial: PvSnapshot,
}

impl Monitor {
    /// Next change, or `None` once the server closed the connection
    pub async fn next(&mut self) -> Option<std::result::Result<Notification, RemoteError>> {
        let line = match self.framed.next().await? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        Some(parse_event(&line))
    }
}

fn parse_event(line: &str) -> std::result::Result<Notification, RemoteError> {
    let rest = line
        .strip_prefix("EVENT ")
        .ok_or_else(|| RemoteError::protocol(format!("unexpected line '{}'", line)))?;
    let (name, rest) = rest
        .split_once(' ')
        .ok_or_else(|| RemoteError::protocol(format!("malformed event '{}'", line)))?;
    let snapshot = parse_snapshot(rest)?;
    Ok(Notification {
        name: name.to_string(),
        value: snapshot.value,
        severity: snapshot.severity,
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot() {
        let snapshot = parse_snapshot("[1, 2] MINOR").unwrap();
        assert_eq!(snapshot.value, FieldValue::IntArray(vec![1, 2]));
        assert_eq!(snapshot.severity, Severity::Minor);

        let snapshot = parse_snapshot(" NONE").unwrap();
        assert_eq!(snapshot.value, FieldValue::Str(String::new()));

        assert!(parse_snapshot("3").is_err());
        assert!(parse_snapshot("3 LOUD").is_err());
    }

    #[test]
    fn test_parse_event() {
        let event = parse_event("EVENT DEV:msg hello world NONE").unwrap();
        assert_eq!(event.name, "DEV:msg");
        assert_eq!(event.value, FieldValue::Str("hello world".into()));
        assert!(parse_event("OK 1 NONE").is_err());
    }

    #[test]
    fn test_remote_error_text_round_trip() {
        for err in [
            RemoteError::NotFound("DEV:x".into()),
            RemoteError::Rejected("7 is outside [0, 5]".into()),
            RemoteError::Unavailable("shut down".into()),
        ] {
            assert_eq!(remote_error(&err.to_string()), err);
        }
    }
}
