//! Network binding of records
//!
//! Publishes each record through the [`Transport`] with a handler that
//! answers remote reads directly and marshals remote writes onto the event
//! loop before touching the record.
//!
//! [`Transport`]: softdev_transport::Transport

use crate::error::{IocError, Result};
use crate::record::{PutFailure, Record};
use crate::scheduler::Scheduler;
use async_trait::async_trait;
use softdev_fields::FieldValue;
use softdev_transport::{PvHandler, PvSnapshot, RemoteError, TransportError};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct RecordBinding {
    pv_name: String,
    record: Weak<Record>,
    scheduler: Arc<dyn Scheduler>,
}

impl RecordBinding {
    fn live(&self) -> std::result::Result<Arc<Record>, RemoteError> {
        self.record
            .upgrade()
            .filter(|record| !record.is_closed())
            .ok_or_else(|| RemoteError::Unavailable(self.pv_name.clone()))
    }
}

#[async_trait]
impl PvHandler for RecordBinding {
    fn remote_get(&self) -> std::result::Result<PvSnapshot, RemoteError> {
        Ok(self.live()?.snapshot())
    }

    async fn remote_put(&self, value: FieldValue) -> std::result::Result<(), RemoteError> {
        let record = self.live()?;
        let (tx, rx) = oneshot::channel();
        let posted = self.scheduler.post(Box::new(move || {
            let _ = tx.send(record.try_put(value));
        }));
        if !posted {
            return Err(RemoteError::Unavailable(self.pv_name.clone()));
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(PutFailure::Rejected(reason))) => {
                Err(RemoteError::rejected(format!("{}: {}", self.pv_name, reason)))
            },
            Ok(Err(PutFailure::Closed)) | Err(_) => {
                Err(RemoteError::Unavailable(self.pv_name.clone()))
            },
        }
    }
}

/// Register `record` with the transport
pub(crate) async fn publish(record: &Arc<Record>) -> Result<()> {
    let shared = record.shared();
    let binding = Arc::new(RecordBinding {
        pv_name: record.pv_name().to_string(),
        record: Arc::downgrade(record),
        scheduler: Arc::clone(&shared.scheduler),
    });
    let handle = shared
        .transport
        .register(record.pv_name(), binding)
        .await
        .map_err(|e| match e {
            TransportError::DuplicateName(name) => IocError::DuplicateName(name),
            other => IocError::Transport(other),
        })?;
    record.set_handle(handle);
    debug!(pv = %record.pv_name(), %handle, "Record published");
    Ok(())
}

/// Push a change still undelivered at shutdown, then flush and revoke
/// `record`'s registration
pub(crate) async fn unpublish(record: &Record, pending: Option<PvSnapshot>) {
    let Some(handle) = record.take_handle() else {
        return;
    };
    let transport = &record.shared().transport;
    if let Some(last) = pending {
        transport.notify(handle, &last.value, last.severity);
    }
    if let Err(e) = transport.flush(handle).await {
        warn!(pv = %record.pv_name(), %handle, "Flush failed: {}", e);
    }
    if let Err(e) = transport.unregister(handle).await {
        warn!(pv = %record.pv_name(), %handle, "Unregister failed: {}", e);
    }
}
