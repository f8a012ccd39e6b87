//! In-memory transport
//!
//! Uses DashMap for concurrent access. Remote peers are simulated by the
//! `get`/`put`/`monitor` methods, which go through the registered handlers
//! exactly as a network request would.

use crate::error::{RemoteError, Result, TransportError};
use crate::traits::{PvHandle, PvHandler, PvSnapshot, Transport};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use softdev_fields::{FieldValue, Severity};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Value change delivered to a monitor
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub name: String,
    pub value: FieldValue,
    pub severity: Severity,
}

struct Registration {
    name: String,
    handler: Arc<dyn PvHandler>,
    monitors: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
}

/// Call counters, mostly useful in tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub registered: usize,
    pub register_calls: u64,
    pub unregister_calls: u64,
    pub notifications: u64,
    pub flushes: u64,
}

#[derive(Default)]
struct Counters {
    register_calls: AtomicU64,
    unregister_calls: AtomicU64,
    notifications: AtomicU64,
    flushes: AtomicU64,
}

/// In-memory transport with concurrent access support
pub struct MemoryTransport {
    next_handle: AtomicU64,
    by_handle: DashMap<PvHandle, Arc<Registration>>,
    by_name: DashMap<String, PvHandle>,
    counters: Counters,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            by_handle: DashMap::new(),
            by_name: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            registered: self.by_handle.len(),
            register_calls: self.counters.register_calls.load(Ordering::Relaxed),
            unregister_calls: self.counters.unregister_calls.load(Ordering::Relaxed),
            notifications: self.counters.notifications.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
        }
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn lookup(&self, name: &str) -> std::result::Result<Arc<Registration>, RemoteError> {
        self.by_name
            .get(name)
            .and_then(|handle| self.by_handle.get(handle.value()).map(|r| r.value().clone()))
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    /// Remote read of `name`
    pub fn get(&self, name: &str) -> std::result::Result<PvSnapshot, RemoteError> {
        self.lookup(name)?.handler.remote_get()
    }

    /// Remote write of `name`
    pub async fn put(&self, name: &str, value: FieldValue) -> std::result::Result<(), RemoteError> {
        // The registration is cloned out so no map guard is held across the await
        let registration = self.lookup(name)?;
        registration.handler.remote_put(value).await
    }

    /// Subscribe to value changes of `name`
    ///
    /// The receiver ends when the variable is unregistered.
    pub fn monitor(
        &self,
        name: &str,
    ) -> std::result::Result<mpsc::UnboundedReceiver<Notification>, RemoteError> {
        let registration = self.lookup(name)?;
        let (tx, rx) = mpsc::unbounded_channel();
        registration.monitors.lock().push(tx);
        Ok(rx)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn register(&self, name: &str, handler: Arc<dyn PvHandler>) -> Result<PvHandle> {
        self.counters.register_calls.fetch_add(1, Ordering::Relaxed);
        let handle = PvHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        match self.by_name.entry(name.to_string()) {
            MapEntry::Occupied(_) => return Err(TransportError::DuplicateName(name.to_string())),
            MapEntry::Vacant(slot) => {
                slot.insert(handle);
            },
        }
        self.by_handle.insert(
            handle,
            Arc::new(Registration {
                name: name.to_string(),
                handler,
                monitors: Mutex::new(Vec::new()),
            }),
        );
        debug!(name, %handle, "Variable registered");
        Ok(handle)
    }

    async fn unregister(&self, handle: PvHandle) -> Result<()> {
        self.counters.unregister_calls.fetch_add(1, Ordering::Relaxed);
        let (_, registration) = self
            .by_handle
            .remove(&handle)
            .ok_or(TransportError::UnknownHandle(handle))?;
        self.by_name.remove(&registration.name);
        // Dropping the senders ends every monitor stream
        registration.monitors.lock().clear();
        debug!(name = %registration.name, %handle, "Variable unregistered");
        Ok(())
    }

    fn notify(&self, handle: PvHandle, value: &FieldValue, severity: Severity) {
        let Some(registration) = self.by_handle.get(&handle).map(|r| r.value().clone()) else {
            trace!(%handle, "Notify for unknown handle ignored");
            return;
        };
        self.counters.notifications.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            name: registration.name.clone(),
            value: value.clone(),
            severity,
        };
        registration
            .monitors
            .lock()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }

    async fn flush(&self, handle: PvHandle) -> Result<()> {
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        if self.by_handle.contains_key(&handle) {
            Ok(())
        } else {
            Err(TransportError::UnknownHandle(handle))
        }
    }
}
