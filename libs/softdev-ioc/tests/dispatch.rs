//! Callback dispatch, remote access and toggle reset

#![allow(clippy::disallowed_methods)]

mod common;

use common::{runtime, settle};
use parking_lot::Mutex;
use softdev_fields::{FieldDescriptor, FieldValue, Severity};
use softdev_ioc::{Callbacks, Model, Schema};
use softdev_transport::RemoteError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn schema() -> Schema {
    Schema::builder("Shutter")
        .field(FieldDescriptor::integer("level").int_range(0, 10))
        .field(FieldDescriptor::enumeration("state", ["Closed", "Open"]))
        .field(FieldDescriptor::toggle("open").description("Open"))
        .build()
        .unwrap()
}

type Seen = Arc<Mutex<Vec<(String, FieldValue)>>>;

fn recorder(
    seen: &Seen,
) -> impl Fn(&str, &FieldValue, &Model) -> anyhow::Result<()> + Send + Sync + 'static {
    let seen = Arc::clone(seen);
    move |pv: &str, value: &FieldValue, _: &Model| {
        seen.lock().push((pv.to_string(), value.clone()));
        Ok(())
    }
}

// ============================================================================
// Ordering and waiting
// ============================================================================

#[tokio::test]
async fn test_callbacks_follow_put_order() {
    let (ioc, _) = runtime();
    let seen: Seen = Arc::default();
    let callbacks = Callbacks::new().on("do_level", recorder(&seen));
    let model = Model::start(&ioc, "SHT1", &schema(), Some(callbacks))
        .await
        .unwrap();

    for value in [1, 2, 3] {
        assert!(model.put("level", value).unwrap());
    }
    settle(&ioc, 1).await;

    let expected: Vec<(String, FieldValue)> = [1, 2, 3]
        .into_iter()
        .map(|v| ("SHT1:level".to_string(), FieldValue::Int(v)))
        .collect();
    assert_eq!(*seen.lock(), expected);
}

#[tokio::test]
async fn test_put_wait_returns_after_callback() {
    let (ioc, _) = runtime();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let callbacks = Callbacks::new().on("level", move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let model = Model::start(&ioc, "SHT1", &schema(), Some(callbacks))
        .await
        .unwrap();

    // The event loop has not had a chance to run yet
    assert!(model.put("level", 1).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(model.put_wait("level", 2).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_callback_effect_visible_after_put_wait() {
    let (ioc, _) = runtime();
    let callbacks = Callbacks::new().on("do_open", |_, value, model| {
        if value.as_bool() == Some(true) {
            model.put("state", "Open")?;
        }
        Ok(())
    });
    let model = Model::start(&ioc, "SHT1", &schema(), Some(callbacks))
        .await
        .unwrap();

    model.put_wait("open", true).await.unwrap();
    assert_eq!(model.get("state").unwrap(), FieldValue::Enum(1));
}

#[tokio::test]
async fn test_subscribe_adds_listener() {
    let (ioc, _) = runtime();
    let model = Model::start(&ioc, "SHT1", &schema(), None).await.unwrap();
    let seen: Seen = Arc::default();
    model.field("state").unwrap().subscribe(recorder(&seen));

    model.put_wait("state", 1).await.unwrap();
    assert_eq!(
        *seen.lock(),
        vec![("SHT1:state".to_string(), FieldValue::Enum(1))]
    );
}

#[tokio::test]
async fn test_rejected_put_dispatches_nothing() {
    let (ioc, transport) = runtime();
    let seen: Seen = Arc::default();
    let callbacks = Callbacks::new().on("level", recorder(&seen));
    let model = Model::start(&ioc, "SHT1", &schema(), Some(callbacks))
        .await
        .unwrap();

    assert!(!model.put("level", 11).unwrap());
    settle(&ioc, 1).await;
    assert!(seen.lock().is_empty());
    assert_eq!(transport.stats().notifications, 0);
}

// ============================================================================
// Remote access
// ============================================================================

#[tokio::test]
async fn test_remote_put_runs_callback() {
    let (ioc, transport) = runtime();
    let seen: Seen = Arc::default();
    let callbacks = Callbacks::new().on("do_level", recorder(&seen));
    let model = Model::start(&ioc, "SHT1", &schema(), Some(callbacks))
        .await
        .unwrap();

    transport.put("SHT1:level", FieldValue::Int(6)).await.unwrap();
    settle(&ioc, 1).await;

    assert_eq!(model.get("level").unwrap(), FieldValue::Int(6));
    assert_eq!(
        *seen.lock(),
        vec![("SHT1:level".to_string(), FieldValue::Int(6))]
    );
    let snapshot = transport.get("SHT1:level").unwrap();
    assert_eq!(snapshot.value, FieldValue::Int(6));
    assert_eq!(snapshot.severity, Severity::None);
}

#[tokio::test]
async fn test_remote_put_out_of_range_is_rejected() {
    let (ioc, transport) = runtime();
    let model = Model::start(&ioc, "SHT1", &schema(), None).await.unwrap();
    model.put("level", 4).unwrap();

    let result = transport.put("SHT1:level", FieldValue::Int(50)).await;
    assert!(matches!(result, Err(RemoteError::Rejected(_))));
    assert_eq!(model.get("level").unwrap(), FieldValue::Int(4));
}

#[tokio::test]
async fn test_monitor_sees_local_changes() {
    let (ioc, transport) = runtime();
    let model = Model::start(&ioc, "SHT1", &schema(), None).await.unwrap();
    let mut events = transport.monitor("SHT1:state").unwrap();

    model.put("state", "Open").unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.name, "SHT1:state");
    assert_eq!(event.value, FieldValue::Enum(1));
    assert_eq!(event.severity, Severity::None);
}

// ============================================================================
// Toggle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_toggle_resets_after_high_time() {
    let (ioc, _) = runtime();
    let seen: Seen = Arc::default();
    let callbacks = Callbacks::new().on("do_open", recorder(&seen));
    let model = Model::start(&ioc, "SHT1", &schema(), Some(callbacks))
        .await
        .unwrap();

    model.put_wait("open", true).await.unwrap();
    assert_eq!(model.get("open").unwrap(), FieldValue::Bool(true));

    tokio::time::sleep(Duration::from_millis(300)).await;
    settle(&ioc, 1).await;

    assert_eq!(model.get("open").unwrap(), FieldValue::Bool(false));
    assert_eq!(
        *seen.lock(),
        vec![
            ("SHT1:open".to_string(), FieldValue::Bool(true)),
            ("SHT1:open".to_string(), FieldValue::Bool(false)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_toggle_reset_skipped_after_newer_change() {
    let (ioc, _) = runtime();
    let model = Model::start(&ioc, "SHT1", &schema(), None).await.unwrap();
    let open = model.field("open").unwrap();

    open.put_wait(true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // A second pulse restarts the high time
    open.put_wait(true).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(open.get(), FieldValue::Bool(true));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(open.get(), FieldValue::Bool(false));
}
