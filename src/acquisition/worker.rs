// src/acquisition/worker.rs
//! Dedicated acquisition thread of an open device

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use crate::acquisition::state::{AcquisitionState, AtomicAcquisitionState};
use crate::error::{CoreError, CoreResult};
use crate::hal::DriverSession;
use crate::utils::time::format_time_date;

/// Receives failures raised on the acquisition thread
pub type ErrorHandler = Arc<dyn Fn(CoreError) + Send + Sync>;

/// Body of the acquisition thread: start the session, block in its receive
/// loop, then mark the device stopped.
///
/// Driver errors never leave the thread; they go to `on_error`.
pub fn run_session(
    session: &dyn DriverSession,
    state: &AtomicAcquisitionState,
    on_error: &ErrorHandler,
    device: &str,
    start_timestamp: f64,
) {
    if let Err(e) = session.start() {
        tracing::error!(device, error = %e, "failed to start acquisition");
        state.store(AcquisitionState::Stopped);
        on_error(CoreError::AcquisitionStart(e));
        return;
    }

    tracing::info!(
        device,
        start = %format_time_date(start_timestamp),
        "acquisition started"
    );

    let result = session.run();
    state.store(AcquisitionState::Stopped);

    match result {
        Ok(()) => tracing::info!(device, "acquisition finished"),
        Err(e) => {
            tracing::error!(device, error = %e, "acquisition aborted");
            on_error(CoreError::AcquisitionRun(e));
        }
    }
}

/// Handle of a running acquisition thread.
///
/// The thread signals completion by dropping its end of a crossbeam
/// channel, which lets [`AcquisitionThread::join`] wait with a deadline.
#[derive(Debug)]
pub struct AcquisitionThread {
    name: String,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl AcquisitionThread {
    /// Spawn a named OS thread running `body`
    pub fn spawn<F>(name: String, body: F) -> CoreResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            // Dropped on return and on unwind
            let _done = done_tx;
            body();
        })?;

        tracing::debug!(thread = %name, "acquisition thread spawned");
        Ok(Self {
            name,
            handle,
            done: done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> thread::ThreadId {
        self.handle.thread().id()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread to exit.
    ///
    /// `None` waits forever. On timeout the thread is detached and
    /// [`CoreError::JoinTimeout`] is returned.
    pub fn join(self, timeout: Option<Duration>) -> CoreResult<()> {
        if let Some(timeout) = timeout {
            match self.done.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    tracing::error!(thread = %self.name, ?timeout, "acquisition thread hangs, detaching");
                    return Err(CoreError::JoinTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }

        self.handle
            .join()
            .map_err(|panic| CoreError::ThreadPanicked(panic_message(panic.as_ref())))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_thread_is_named() {
        let thread = AcquisitionThread::spawn("acq-test".to_string(), || {
            assert_eq!(thread::current().name(), Some("acq-test"));
        })
        .unwrap();
        assert_eq!(thread.name(), "acq-test");
        thread.join(None).unwrap();
    }

    #[test]
    fn test_bounded_join_of_finished_thread() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let thread = AcquisitionThread::spawn("acq-quick".to_string(), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

        thread.join(Some(Duration::from_secs(5))).unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_join_timeout_detaches() {
        let (release_tx, release_rx) = channel::bounded::<()>(0);
        let thread = AcquisitionThread::spawn("acq-stuck".to_string(), move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        let result = thread.join(Some(Duration::from_millis(20)));
        assert!(matches!(result, Err(CoreError::JoinTimeout { timeout_ms: 20 })));
        drop(release_tx);
    }

    #[test]
    fn test_panic_is_reported() {
        let thread = AcquisitionThread::spawn("acq-panic".to_string(), || {
            panic!("driver exploded");
        })
        .unwrap();

        match thread.join(Some(Duration::from_secs(5))) {
            Err(CoreError::ThreadPanicked(msg)) => assert!(msg.contains("driver exploded")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
