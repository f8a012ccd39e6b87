//! Change dispatch
//!
//! Runs on the event loop once per committed change:
//! 1. push the change to the transport
//! 2. run every listener, isolating failures
//! 3. process calc records watching this record
//! 4. arm the auto-reset of a toggle
//! 5. release the `put_wait` caller waiting for this change

use crate::calc;
use crate::record::Record;
use crate::scheduler::panic_message;
use softdev_fields::{FieldValue, Severity};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

/// One committed change of a record
#[derive(Debug, Clone)]
pub(crate) struct Change {
    pub seq: u64,
    pub value: FieldValue,
    pub severity: Severity,
}

pub(crate) fn run(record: &Arc<Record>, change: Change) {
    let Some((handle, listeners)) = record.dispatch_targets(change.seq) else {
        trace!(pv = %record.pv_name(), seq = change.seq, "Record closed, change not dispatched");
        return;
    };

    if let Some(handle) = handle {
        record
            .shared()
            .transport
            .notify(handle, &change.value, change.severity);
    }

    if !listeners.is_empty() {
        if let Some(model) = record.model() {
            for listener in &listeners {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    listener(record.pv_name(), &change.value, &model)
                }));
                match outcome {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => {
                        error!(pv = %record.pv_name(), value = %change.value, "Callback failed: {:#}", e);
                    },
                    Err(payload) => {
                        error!(
                            pv = %record.pv_name(),
                            value = %change.value,
                            "Callback panicked: {}",
                            panic_message(payload.as_ref())
                        );
                    },
                }
            }
        }
    }

    for watcher in record.shared().directory.watchers(record.pv_name()) {
        calc::process(&watcher);
    }

    if let (Some(high), FieldValue::Bool(true)) = (record.descriptor().high(), &change.value) {
        let target = Arc::clone(record);
        let seq = change.seq;
        record
            .shared()
            .scheduler
            .post_after(high, Box::new(move || target.reset_toggle(seq)));
    }

    record.complete(change.seq);
}
