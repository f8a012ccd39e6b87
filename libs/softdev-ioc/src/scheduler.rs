//! Scheduler seam and the tokio event loop behind it
//!
//! All callback execution and change dispatch runs as jobs on one event
//! loop. Jobs run one at a time in posting order, so per-record ordering
//! follows from posting in acceptance order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Unit of work for the event loop
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Minimal scheduling primitive consumed by the runtime
///
/// `put_wait` suspends on a completion signal sent by the posted dispatch
/// job, so no blocking wait primitive is needed here.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `job` on a later loop iteration; `false` once the loop is gone
    ///
    /// Must not block: it is called while record state is locked.
    fn post(&self, job: Job) -> bool;

    /// Run `job` after `delay`
    fn post_after(&self, delay: Duration, job: Job);
}

/// Create a connected handle / loop pair
pub fn event_loop() -> (LoopHandle, EventLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LoopHandle { tx }, EventLoop { rx })
}

/// Posting side of an [`EventLoop`]
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl Scheduler for LoopHandle {
    fn post(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }

    fn post_after(&self, delay: Duration, job: Job) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(job);
        });
    }
}

/// Single-consumer job queue
///
/// Runs until every [`LoopHandle`] is dropped, or until cancelled.
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl EventLoop {
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            run_job(job);
        }
        debug!("Event loop finished");
    }

    pub async fn run_until_cancelled(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => run_job(job),
                    None => break,
                },
            }
        }
        debug!("Event loop stopped");
    }

    /// Run the loop on its own tokio task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Describe a panic payload for logging
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_job(job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        error!("Event loop job panicked: {}", panic_message(payload.as_ref()));
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_jobs_run_in_posting_order() {
        let (handle, event_loop) = event_loop();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            assert!(handle.post(Box::new(move || seen.lock().push(i))));
        }
        drop(handle);
        event_loop.run().await;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_loop() {
        let (handle, event_loop) = event_loop();
        let seen = Arc::new(Mutex::new(0));
        handle.post(Box::new(|| panic!("boom")));
        let counter = Arc::clone(&seen);
        handle.post(Box::new(move || *counter.lock() += 1));
        drop(handle);
        event_loop.run().await;
        assert_eq!(*seen.lock(), 1);
    }

    #[tokio::test]
    async fn test_post_fails_after_loop_dropped() {
        let (handle, event_loop) = event_loop();
        drop(event_loop);
        assert!(!handle.post(Box::new(|| {})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_after_delays_job() {
        let (handle, event_loop) = event_loop();
        let seen = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&seen);
        handle.post_after(Duration::from_secs(1), Box::new(move || *flag.lock() = true));
        let cancel = CancellationToken::new();
        let runner = tokio::spawn(event_loop.run_until_cancelled(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!*seen.lock());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(*seen.lock());

        cancel.cancel();
        runner.await.unwrap();
    }
}
