//! Model start, naming and shutdown

#![allow(clippy::disallowed_methods)]

mod common;

use common::{runtime, settle};
use softdev_fields::{FieldDescriptor, FieldValue, NamedFieldSpec};
use softdev_ioc::{Callbacks, Ioc, IocError, Model, Schema};
use softdev_transport::{MemoryTransport, RemoteError};
use std::sync::Arc;

fn schema() -> Schema {
    Schema::builder("Pump")
        .field(FieldDescriptor::integer("speed").int_range(0, 3000).units("rpm"))
        .field(FieldDescriptor::toggle("start").description("Start"))
        .field(FieldDescriptor::string("status"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_records_are_published_by_device_name() {
    let (ioc, transport) = runtime();
    let model = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();

    assert_eq!(
        transport.names(),
        vec!["PMP1:speed", "PMP1:start", "PMP1:status"]
    );
    assert_eq!(ioc.names(), transport.names());
    let names: Vec<&str> = model.records().iter().map(|r| r.name()).collect();
    assert_eq!(names, ["speed", "start", "status"]);

    let speed = ioc.record("PMP1:speed").unwrap();
    assert!(Arc::ptr_eq(&speed, model.field("speed").unwrap()));
    assert_eq!(speed.device_name(), "PMP1");
}

#[tokio::test]
async fn test_two_devices_share_a_schema() {
    let (ioc, transport) = runtime();
    let schema = schema();
    let a = Model::start(&ioc, "PMP1", &schema, None).await.unwrap();
    let b = Model::start(&ioc, "PMP2", &schema, None).await.unwrap();

    a.put("speed", 100).unwrap();
    b.put("speed", 200).unwrap();
    assert_eq!(transport.get("PMP1:speed").unwrap().value, FieldValue::Int(100));
    assert_eq!(transport.get("PMP2:speed").unwrap().value, FieldValue::Int(200));
    assert_eq!(transport.stats().registered, 6);
}

#[tokio::test]
async fn test_duplicate_device_fails_cleanly() {
    let (ioc, transport) = runtime();
    let first = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();

    let result = Model::start(&ioc, "PMP1", &schema(), None).await;
    assert_eq!(result.unwrap_err(), IocError::DuplicateName("PMP1:speed".into()));

    assert_eq!(transport.stats().registered, 3);
    assert!(first.put("speed", 5).unwrap());
    assert_eq!(transport.get("PMP1:speed").unwrap().value, FieldValue::Int(5));
}

#[tokio::test]
async fn test_name_taken_on_transport_rolls_back() {
    let transport = Arc::new(MemoryTransport::new());
    let (ioc_a, loop_a) = Ioc::with_event_loop(transport.clone());
    let (ioc_b, loop_b) = Ioc::with_event_loop(transport.clone());
    loop_a.spawn();
    loop_b.spawn();

    let _first = Model::start(&ioc_a, "PMP1", &schema(), None).await.unwrap();
    let other = Schema::builder("Other")
        .field(FieldDescriptor::integer("flow"))
        .field(FieldDescriptor::integer("speed"))
        .build()
        .unwrap();
    let result = Model::start(&ioc_b, "PMP1", &other, None).await;

    assert_eq!(result.unwrap_err(), IocError::DuplicateName("PMP1:speed".into()));
    assert!(!transport.contains("PMP1:flow"));
    assert!(ioc_b.names().is_empty());
}

#[tokio::test]
async fn test_invalid_device_name() {
    let (ioc, _) = runtime();
    for name in ["", "9lives", "has space", "a:b"] {
        let result = Model::start(&ioc, name, &schema(), None).await;
        assert!(
            matches!(result, Err(IocError::Definition(_))),
            "{:?} should be rejected",
            name
        );
    }
}

#[tokio::test]
async fn test_unmatched_callback_is_not_an_error() {
    let (ioc, _) = runtime();
    let callbacks = Callbacks::new().on("do_nothing", |_, _, _| Ok(()));
    assert!(Model::start(&ioc, "PMP1", &schema(), Some(callbacks)).await.is_ok());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let (ioc, transport) = runtime();
    let model = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();

    model.shutdown().await;
    let after_first = transport.stats();
    assert_eq!(after_first.unregister_calls, 3);
    assert_eq!(after_first.registered, 0);
    assert!(model.is_shut_down());

    model.shutdown().await;
    assert_eq!(transport.stats(), after_first);
    assert!(ioc.names().is_empty());
}

#[tokio::test]
async fn test_puts_after_shutdown() {
    let (ioc, transport) = runtime();
    let model = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();
    model.put("speed", 10).unwrap();
    model.shutdown().await;

    assert!(!model.put("speed", 20).unwrap());
    assert!(matches!(
        model.put_wait("speed", 20).await,
        Err(IocError::Shutdown(_))
    ));
    assert_eq!(model.get("speed").unwrap(), FieldValue::Int(10));
    assert!(matches!(
        transport.get("PMP1:speed"),
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_pending_wait_fails_on_shutdown() {
    let transport = Arc::new(MemoryTransport::new());
    // The loop is never run, so the wait cannot complete on its own
    let (ioc, _event_loop) = Ioc::with_event_loop(transport);
    let model = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();

    let record = Arc::clone(model.field("speed").unwrap());
    let waiter = tokio::spawn(async move { record.put_wait(42).await });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!waiter.is_finished());
    assert_eq!(model.get("speed").unwrap(), FieldValue::Int(42));

    model.shutdown().await;
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(IocError::Shutdown(name)) if name == "PMP1:speed"));
}

#[tokio::test]
async fn test_shutdown_delivers_undispatched_change() {
    let transport = Arc::new(MemoryTransport::new());
    // Dispatch jobs stay queued while the loop is not run
    let (ioc, _event_loop) = Ioc::with_event_loop(transport.clone());
    let model = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();
    let mut monitor = transport.monitor("PMP1:speed").unwrap();

    assert!(model.put("speed", 5).unwrap());
    model.shutdown().await;

    let mut seen = Vec::new();
    while let Some(notification) = monitor.recv().await {
        seen.push(notification.value);
    }
    assert_eq!(seen, [FieldValue::Int(5)]);
    let stats = transport.stats();
    assert_eq!(stats.notifications, 1);
    assert_eq!(stats.flushes, 3);
    assert_eq!(stats.registered, 0);
}

#[tokio::test]
async fn test_shutdown_does_not_repeat_dispatched_change() {
    let (ioc, transport) = runtime();
    let model = Model::start(&ioc, "PMP1", &schema(), None).await.unwrap();
    let mut monitor = transport.monitor("PMP1:speed").unwrap();

    model.put("speed", 5).unwrap();
    settle(&ioc, 1).await;
    model.shutdown().await;

    let mut seen = Vec::new();
    while let Some(notification) = monitor.recv().await {
        seen.push(notification.value);
    }
    assert_eq!(seen, [FieldValue::Int(5)]);
    assert_eq!(transport.stats().notifications, 1);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_schema_from_yaml_specs() {
    let yaml = r#"
- name: mode
  kind: enum
  choices: [Idle, Run]
- name: rate
  kind: float
  min: 0
  max: 10
  units: Hz
- name: doubled
  kind: calc
  calc: "A*2"
  inputs:
    A: rate CP
"#;
    let specs: Vec<NamedFieldSpec> = serde_yaml::from_str(yaml).unwrap();
    let schema = Schema::from_specs("Gen", &specs).unwrap();
    assert_eq!(schema.len(), 3);

    let (ioc, _) = runtime();
    let model = Model::start(&ioc, "GEN", &schema, None).await.unwrap();
    model.put_wait("rate", 2.5).await.unwrap();
    assert_eq!(model.get("doubled").unwrap(), FieldValue::Float(5.0));
    assert!(!model.put("rate", 11.0).unwrap());
}
