//! Line protocol tests
//!
//! Runs a `TcpTransport` on an ephemeral port and talks to it through
//! `TcpClient` and through a raw socket.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use async_trait::async_trait;
use parking_lot::Mutex;
use softdev_fields::{FieldValue, Severity};
use softdev_transport::{
    PvHandler, PvSnapshot, RemoteError, TcpClient, TcpTransport, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Accepts integers in 0..=10
struct Bounded(Mutex<i64>);

#[async_trait]
impl PvHandler for Bounded {
    fn remote_get(&self) -> Result<PvSnapshot, RemoteError> {
        Ok(PvSnapshot {
            value: FieldValue::Int(*self.0.lock()),
            severity: Severity::None,
        })
    }

    async fn remote_put(&self, value: FieldValue) -> Result<(), RemoteError> {
        match value {
            FieldValue::Int(v) if (0..=10).contains(&v) => {
                *self.0.lock() = v;
                Ok(())
            },
            other => Err(RemoteError::rejected(format!("{} is outside [0, 10]", other))),
        }
    }
}

async fn server() -> TcpTransport {
    TcpTransport::bind("127.0.0.1:0").await.unwrap()
}

// ============================================================================
// Client round trips
// ============================================================================

#[tokio::test]
async fn test_get_and_put() {
    let transport = server().await;
    transport
        .register("DEV:level", Arc::new(Bounded(Mutex::new(3))))
        .await
        .unwrap();

    let mut client = TcpClient::connect(transport.local_addr()).await.unwrap();
    let snapshot = client.get("DEV:level").await.unwrap();
    assert_eq!(snapshot.value, FieldValue::Int(3));
    assert_eq!(snapshot.severity, Severity::None);

    client.put("DEV:level", &FieldValue::Int(7)).await.unwrap();
    assert_eq!(
        client.get("DEV:level").await.unwrap().value,
        FieldValue::Int(7)
    );
}

#[tokio::test]
async fn test_rejected_put_reports_error_status() {
    let transport = server().await;
    transport
        .register("DEV:level", Arc::new(Bounded(Mutex::new(3))))
        .await
        .unwrap();

    let mut client = TcpClient::connect(transport.local_addr()).await.unwrap();
    let err = client.put("DEV:level", &FieldValue::Int(11)).await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected(_)));
    assert_eq!(
        client.get("DEV:level").await.unwrap().value,
        FieldValue::Int(3)
    );

    let err = client.get("DEV:missing").await.unwrap_err();
    assert_eq!(err, RemoteError::NotFound("DEV:missing".into()));
}

#[tokio::test]
async fn test_monitor_streams_events() {
    let transport = server().await;
    let handle = transport
        .register("DEV:level", Arc::new(Bounded(Mutex::new(0))))
        .await
        .unwrap();

    let client = TcpClient::connect(transport.local_addr()).await.unwrap();
    let mut monitor = client.monitor("DEV:level").await.unwrap();
    assert_eq!(monitor.initial.value, FieldValue::Int(0));

    transport.notify(handle, &FieldValue::Int(4), Severity::Major);
    let event = tokio::time::timeout(Duration::from_secs(5), monitor.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.name, "DEV:level");
    assert_eq!(event.value, FieldValue::Int(4));
    assert_eq!(event.severity, Severity::Major);
}

// ============================================================================
// Raw protocol
// ============================================================================

#[tokio::test]
async fn test_raw_protocol_errors() {
    let transport = server().await;
    let stream = TcpStream::connect(transport.local_addr()).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"FETCH DEV:x\n").await.unwrap();
    let reply = lines.next_line().await.unwrap().unwrap();
    assert!(reply.starts_with("ERR Protocol error"), "{}", reply);

    write.write_all(b"GET\n").await.unwrap();
    let reply = lines.next_line().await.unwrap().unwrap();
    assert!(reply.starts_with("ERR"), "{}", reply);

    write.write_all(b"get DEV:x\n").await.unwrap();
    let reply = lines.next_line().await.unwrap().unwrap();
    assert_eq!(reply, "ERR Not found: DEV:x");
}
