//! Live records
//!
//! A record holds the current value and severity of one field of a running
//! model. Accepted puts commit immediately; listeners, remote monitors and
//! dependent calc records are informed by a dispatch job on the event loop,
//! one job per accepted change, in acceptance order.

use crate::dispatch::{self, Change};
use crate::error::{IocError, Result};
use crate::ioc::IocShared;
use crate::model::{Callback, Model, ModelInner};
use parking_lot::Mutex;
use softdev_fields::{FieldDescriptor, FieldValue, Rejection, Severity};
use softdev_transport::{PvHandle, PvSnapshot};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Why a put did not commit
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PutFailure {
    Rejected(Rejection),
    Closed,
}

struct RecordState {
    value: FieldValue,
    severity: Severity,
    /// Incremented on every committed change
    seq: u64,
    /// Latest change handed to the transport
    notified: u64,
    closed: bool,
    listeners: Vec<Callback>,
    /// `put_wait` callers keyed by the change they wait for
    waiters: BTreeMap<u64, oneshot::Sender<()>>,
    handle: Option<PvHandle>,
    last_output: Option<f64>,
}

/// One live field of a running model
pub struct Record {
    pv_name: String,
    device_name: String,
    field: Arc<FieldDescriptor>,
    shared: Arc<IocShared>,
    owner: Weak<ModelInner>,
    state: Mutex<RecordState>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Record")
            .field("pv_name", &self.pv_name)
            .field("value", &state.value)
            .field("severity", &state.severity)
            .field("closed", &state.closed)
            .finish()
    }
}

impl Record {
    pub(crate) fn new(
        device_name: &str,
        field: Arc<FieldDescriptor>,
        shared: Arc<IocShared>,
        owner: Weak<ModelInner>,
    ) -> Self {
        Self {
            pv_name: format!("{}:{}", device_name, field.name()),
            device_name: device_name.to_string(),
            state: Mutex::new(RecordState {
                value: field.default_value().clone(),
                severity: Severity::None,
                seq: 0,
                notified: 0,
                closed: false,
                listeners: Vec::new(),
                waiters: BTreeMap::new(),
                handle: None,
                last_output: None,
            }),
            field,
            shared,
            owner,
        }
    }

    /// Field name within the model
    pub fn name(&self) -> &str {
        self.field.name()
    }

    /// Published `<device>:<field>` name
    pub fn pv_name(&self) -> &str {
        &self.pv_name
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.field
    }

    pub fn get(&self) -> FieldValue {
        self.state.lock().value.clone()
    }

    pub fn severity(&self) -> Severity {
        self.state.lock().severity
    }

    /// Value and severity read together
    pub fn snapshot(&self) -> PvSnapshot {
        let state = self.state.lock();
        PvSnapshot {
            value: state.value.clone(),
            severity: state.severity,
        }
    }

    /// Current value rendered with the field's labels, units and precision
    pub fn format(&self) -> String {
        self.field.format_value(&self.get())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Propose a new value without waiting for its callbacks
    ///
    /// Returns `false` and leaves the record untouched when the value is
    /// rejected or the model has shut down.
    pub fn put(self: &Arc<Self>, value: impl Into<FieldValue>) -> bool {
        self.try_put(value.into()).is_ok()
    }

    /// Propose a new value and wait until its change has been dispatched
    ///
    /// Resolves after every listener for this change has returned.
    /// `Ok(false)` means the value was rejected; a shutdown before or during
    /// the wait is an error.
    pub async fn put_wait(self: &Arc<Self>, value: impl Into<FieldValue>) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        match self.submit(value.into(), Some(tx)) {
            Ok(()) => {},
            Err(PutFailure::Rejected(_)) => return Ok(false),
            Err(PutFailure::Closed) => return Err(IocError::shutdown(&self.pv_name)),
        }
        rx.await.map_err(|_| IocError::shutdown(&self.pv_name))?;
        Ok(true)
    }

    /// Add a change listener
    ///
    /// Listeners run on the event loop, once per accepted change, with the
    /// published name, the new value and the owning model.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&str, &FieldValue, &Model) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(listener));
    }

    pub(crate) fn add_listener(&self, listener: Callback) {
        self.state.lock().listeners.push(listener);
    }

    pub(crate) fn try_put(self: &Arc<Self>, raw: FieldValue) -> std::result::Result<(), PutFailure> {
        self.submit(raw, None)
    }

    fn submit(
        self: &Arc<Self>,
        raw: FieldValue,
        waiter: Option<oneshot::Sender<()>>,
    ) -> std::result::Result<(), PutFailure> {
        let mut state = self.state.lock();
        if state.closed {
            debug!(pv = %self.pv_name, "Put after shutdown ignored");
            return Err(PutFailure::Closed);
        }
        let coerced = match self.field.coerce(&raw) {
            Ok(coerced) => coerced,
            Err(reason) => {
                debug!(pv = %self.pv_name, value = %raw, %reason, "Put rejected");
                return Err(PutFailure::Rejected(reason));
            },
        };
        let severity = if coerced.clamped {
            Severity::Invalid
        } else {
            Severity::None
        };
        self.commit_locked(&mut state, coerced.value, severity, waiter)
    }

    /// Commit a calculated value, dispatching only if something changed
    pub(crate) fn commit_if_changed(self: &Arc<Self>, value: FieldValue, severity: Severity) -> bool {
        let mut state = self.state.lock();
        if state.closed || (state.value == value && state.severity == severity) {
            return false;
        }
        self.commit_locked(&mut state, value, severity, None).is_ok()
    }

    /// Drop back to `false` unless another change happened since `seq`
    pub(crate) fn reset_toggle(self: &Arc<Self>, seq: u64) {
        let mut state = self.state.lock();
        if state.closed || state.seq != seq {
            return;
        }
        let _ = self.commit_locked(&mut state, FieldValue::Bool(false), Severity::None, None);
    }

    fn commit_locked(
        self: &Arc<Self>,
        state: &mut RecordState,
        value: FieldValue,
        severity: Severity,
        waiter: Option<oneshot::Sender<()>>,
    ) -> std::result::Result<(), PutFailure> {
        let seq = state.seq + 1;
        let change = Change {
            seq,
            value: value.clone(),
            severity,
        };
        // Posting under the lock keeps dispatch order equal to commit order
        let record = Arc::clone(self);
        if !self
            .shared
            .scheduler
            .post(Box::new(move || dispatch::run(&record, change)))
        {
            warn!(pv = %self.pv_name, "Event loop gone, change dropped");
            return Err(PutFailure::Closed);
        }
        state.value = value;
        state.severity = severity;
        state.seq = seq;
        if let Some(waiter) = waiter {
            state.waiters.insert(seq, waiter);
        }
        Ok(())
    }

    /// Listeners and transport handle for dispatching change `seq`
    ///
    /// `None` once closed; the change is then left to [`Record::close`].
    pub(crate) fn dispatch_targets(&self, seq: u64) -> Option<(Option<PvHandle>, Vec<Callback>)> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.notified = state.notified.max(seq);
        Some((state.handle, state.listeners.clone()))
    }

    pub(crate) fn complete(&self, seq: u64) {
        if let Some(waiter) = self.state.lock().waiters.remove(&seq) {
            let _ = waiter.send(());
        }
    }

    /// Record the latest calcout result, returning the previous one
    pub(crate) fn swap_last_output(&self, result: f64) -> Option<f64> {
        self.state.lock().last_output.replace(result)
    }

    pub(crate) fn set_handle(&self, handle: PvHandle) {
        self.state.lock().handle = Some(handle);
    }

    pub(crate) fn take_handle(&self) -> Option<PvHandle> {
        self.state.lock().handle.take()
    }

    /// Stop accepting changes; pending waits resolve with a shutdown error
    ///
    /// Returns the latest committed value when its dispatch has not reached
    /// the transport yet, so it can still be pushed before unregistering.
    pub(crate) fn close(&self) -> Option<PvSnapshot> {
        let mut state = self.state.lock();
        state.closed = true;
        state.listeners.clear();
        // Dropping the senders wakes every waiter
        state.waiters.clear();
        if state.seq <= state.notified {
            return None;
        }
        state.notified = state.seq;
        Some(PvSnapshot {
            value: state.value.clone(),
            severity: state.severity,
        })
    }

    pub(crate) fn shared(&self) -> &Arc<IocShared> {
        &self.shared
    }

    pub(crate) fn model(&self) -> Option<Model> {
        self.owner.upgrade().map(Model::from_inner)
    }
}
