//! Runtime context shared by every model of one process

use crate::directory::Directory;
use crate::error::{IocError, Result};
use crate::record::Record;
use crate::scheduler::{event_loop, EventLoop, Scheduler};
use softdev_transport::Transport;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) struct IocShared {
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) directory: Directory,
}

/// Handle to the runtime: scheduler, transport and the record directory
///
/// Cheap to clone. Models started on the same `Ioc` can reference each
/// other's records by published name in calc inputs.
#[derive(Clone)]
pub struct Ioc {
    shared: Arc<IocShared>,
}

impl Ioc {
    pub fn new(scheduler: Arc<dyn Scheduler>, transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(IocShared {
                scheduler,
                transport,
                directory: Directory::new(),
            }),
        }
    }

    /// Create an `Ioc` driven by a fresh [`EventLoop`]
    ///
    /// The loop must be run (usually with [`EventLoop::spawn`]) for any
    /// change to be dispatched.
    pub fn with_event_loop(transport: Arc<dyn Transport>) -> (Self, EventLoop) {
        let (handle, event_loop) = event_loop();
        (Self::new(Arc::new(handle), transport), event_loop)
    }

    pub(crate) fn shared(&self) -> &Arc<IocShared> {
        &self.shared
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.shared.scheduler
    }

    /// Live record by published name
    pub fn record(&self, pv_name: &str) -> Option<Arc<Record>> {
        self.shared.directory.lookup(pv_name)
    }

    /// Published names of all live records, sorted
    pub fn names(&self) -> Vec<String> {
        self.shared.directory.names()
    }

    /// Wait until every job posted so far has run
    ///
    /// Jobs posted by those jobs (a calc cascade, for example) are not
    /// covered; call again to drain one more level.
    pub async fn barrier(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let posted = self.shared.scheduler.post(Box::new(move || {
            let _ = tx.send(());
        }));
        if !posted {
            return Err(IocError::shutdown("event loop"));
        }
        rx.await.map_err(|_| IocError::shutdown("event loop"))
    }
}
