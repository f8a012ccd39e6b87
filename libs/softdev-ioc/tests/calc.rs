//! Calc and calcout records

#![allow(clippy::disallowed_methods)]

mod common;

use common::{runtime, settle};
use softdev_fields::{FieldDescriptor, FieldValue, OutputOption, Severity};
use softdev_ioc::{Model, Schema};
use std::time::Duration;

#[tokio::test]
async fn test_sum_of_record_and_constant() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Adder")
        .field(FieldDescriptor::integer("a").default(3))
        .field(
            FieldDescriptor::calc("sum", "A+B")
                .input('A', "a CP")
                .input('B', "4"),
        )
        .build()
        .unwrap();
    let model = Model::start(&ioc, "ADD", &schema, None).await.unwrap();
    settle(&ioc, 1).await;

    let sum = model.field("sum").unwrap();
    assert_eq!(sum.get(), FieldValue::Float(7.0));
    assert_eq!(sum.severity(), Severity::None);

    // Processing happens inside the dispatch of `a`
    model.put_wait("a", 10).await.unwrap();
    assert_eq!(sum.get(), FieldValue::Float(14.0));
}

#[tokio::test]
async fn test_missing_input_keeps_value_and_sets_invalid() {
    let (ioc, _) = runtime();
    let source = Schema::builder("Source")
        .field(FieldDescriptor::integer("x").default(3))
        .build()
        .unwrap();
    let derived = Schema::builder("Derived")
        .field(FieldDescriptor::integer("k"))
        .field(
            FieldDescriptor::calc("sum", "A+B")
                .input('A', "SRC:x CP")
                .input('B', "k CP"),
        )
        .build()
        .unwrap();

    let src = Model::start(&ioc, "SRC", &source, None).await.unwrap();
    let model = Model::start(&ioc, "DRV", &derived, None).await.unwrap();
    model.put_wait("k", 4).await.unwrap();
    let sum = model.field("sum").unwrap();
    assert_eq!(sum.get(), FieldValue::Float(7.0));

    // Cross-device trigger
    src.put_wait("x", 5).await.unwrap();
    assert_eq!(sum.get(), FieldValue::Float(9.0));

    src.shutdown().await;
    model.put_wait("k", 1).await.unwrap();
    assert_eq!(sum.get(), FieldValue::Float(9.0));
    assert_eq!(sum.severity(), Severity::Invalid);
}

#[tokio::test]
async fn test_input_not_started_yet_is_invalid() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Lonely")
        .field(FieldDescriptor::calc("half", "A/2").input('A', "ELSEWHERE:x CP"))
        .build()
        .unwrap();
    let model = Model::start(&ioc, "LON", &schema, None).await.unwrap();
    settle(&ioc, 1).await;

    let half = model.field("half").unwrap();
    assert_eq!(half.severity(), Severity::Invalid);
    assert_eq!(half.get(), FieldValue::Float(0.0));

    // Starting the source later triggers through the watch list
    let source = Schema::builder("Elsewhere")
        .field(FieldDescriptor::integer("x"))
        .build()
        .unwrap();
    let other = Model::start(&ioc, "ELSEWHERE", &source, None).await.unwrap();
    other.put_wait("x", 8).await.unwrap();
    assert_eq!(half.get(), FieldValue::Float(4.0));
    assert_eq!(half.severity(), Severity::None);
}

#[tokio::test]
async fn test_evaluation_failures_are_invalid() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Ratio")
        .field(FieldDescriptor::integer("num").default(6))
        .field(FieldDescriptor::integer("den").default(3))
        .field(
            FieldDescriptor::calc("ratio", "A/B")
                .input('A', "num CP")
                .input('B', "den CP")
                .output_limits(0.0, 10.0),
        )
        .build()
        .unwrap();
    let model = Model::start(&ioc, "RAT", &schema, None).await.unwrap();
    settle(&ioc, 1).await;
    let ratio = model.field("ratio").unwrap();
    assert_eq!(ratio.get(), FieldValue::Float(2.0));

    model.put_wait("den", 0).await.unwrap();
    assert_eq!(ratio.get(), FieldValue::Float(2.0));
    assert_eq!(ratio.severity(), Severity::Invalid);

    model.put_wait("den", 1).await.unwrap();
    assert_eq!(ratio.get(), FieldValue::Float(6.0));
    assert_eq!(ratio.severity(), Severity::None);

    // 30 is outside the output limits
    model.put_wait("num", 30).await.unwrap();
    assert_eq!(ratio.get(), FieldValue::Float(6.0));
    assert_eq!(ratio.severity(), Severity::Invalid);
}

#[tokio::test]
async fn test_severity_maximized_only_for_ms_inputs() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Sev")
        .field(FieldDescriptor::integer("src").int_range(0, 100).clamp(true))
        .field(FieldDescriptor::calc("strict", "A").input('A', "src CP MS"))
        .field(FieldDescriptor::calc("lax", "A").input('A', "src CP"))
        .build()
        .unwrap();
    let model = Model::start(&ioc, "SEV", &schema, None).await.unwrap();
    settle(&ioc, 1).await;

    model.put_wait("src", 500).await.unwrap();
    let strict = model.field("strict").unwrap();
    let lax = model.field("lax").unwrap();
    assert_eq!(strict.get(), FieldValue::Float(100.0));
    assert_eq!(strict.severity(), Severity::Invalid);
    assert_eq!(lax.get(), FieldValue::Float(100.0));
    assert_eq!(lax.severity(), Severity::None);

    model.put_wait("src", 50).await.unwrap();
    assert_eq!(strict.severity(), Severity::None);
}

// ============================================================================
// Calcout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scanned_counter_cycles() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Counter")
        .field(FieldDescriptor::integer("count").int_range(0, 9))
        .field(
            FieldDescriptor::calcout("next", "A >= 9 ? 0 : A + 1", "count")
                .input('A', "count")
                .scan(Duration::from_secs(1)),
        )
        .build()
        .unwrap();
    let model = Model::start(&ioc, "CNT", &schema, None).await.unwrap();

    // Initial processing already advances once
    settle(&ioc, 1).await;
    assert_eq!(model.get("count").unwrap(), FieldValue::Int(1));

    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert_eq!(model.get("count").unwrap(), FieldValue::Int(2));

    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(model.get("count").unwrap(), FieldValue::Int(0));

    model.shutdown().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(model.get("count").unwrap(), FieldValue::Int(0));
}

#[tokio::test]
async fn test_on_change_output_option() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Alarm")
        .field(FieldDescriptor::integer("level"))
        .field(FieldDescriptor::boolean("alarm"))
        .field(
            FieldDescriptor::calcout("check", "A > 5", "alarm")
                .input('A', "level CP")
                .output_option(OutputOption::OnChange),
        )
        .build()
        .unwrap();
    let writes = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = std::sync::Arc::clone(&writes);
    let callbacks = softdev_ioc::Callbacks::new().on("do_alarm", move |_, value, _| {
        log.lock().push(value.clone());
        Ok(())
    });
    let model = Model::start(&ioc, "ALM", &schema, Some(callbacks))
        .await
        .unwrap();
    settle(&ioc, 2).await;

    for level in [1, 7, 8, 2] {
        model.put_wait("level", level).await.unwrap();
    }
    settle(&ioc, 1).await;

    assert_eq!(
        *writes.lock(),
        vec![
            FieldValue::Bool(false),
            FieldValue::Bool(true),
            FieldValue::Bool(false),
        ]
    );
}

#[tokio::test]
async fn test_output_failure_leaves_calc_value() {
    let (ioc, _) = runtime();
    let schema = Schema::builder("Stray")
        .field(FieldDescriptor::integer("a").default(2))
        .field(FieldDescriptor::calcout("c", "A*A", "NOWHERE:x").input('A', "a CP"))
        .build()
        .unwrap();
    let model = Model::start(&ioc, "STR", &schema, None).await.unwrap();
    settle(&ioc, 1).await;

    let c = model.field("c").unwrap();
    assert_eq!(c.get(), FieldValue::Float(4.0));
    assert_eq!(c.severity(), Severity::None);
}
