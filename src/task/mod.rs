//! Cancellable background tasks
//!
//! One worker thread per task, a result channel, and a cooperative stop
//! flag. Cancellation is never preemptive: workers poll the flag at loop
//! heads and before file operations, and the owner joins on drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, TryRecvError};

/// Cooperative cancellation flag shared between a task and its worker.
#[derive(Debug, Default)]
pub struct CancelFlag {
    stop: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to wind down at its next suspension point.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// A background computation with a single result.
///
/// The worker receives the shared [`CancelFlag`] and is expected to poll it;
/// destroying the task requests stop and joins the thread. Dropping a task
/// without joining is not possible by construction.
pub struct AsyncTask<T> {
    handle: Option<JoinHandle<()>>,
    receiver: Receiver<T>,
    cancel: Arc<CancelFlag>,
    result: Option<T>,
}

impl<T: Send + 'static> AsyncTask<T> {
    /// Spawn `work` on a fresh worker thread.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce(&CancelFlag) -> T + Send + 'static,
    {
        let cancel = Arc::new(CancelFlag::new());
        let worker_cancel = Arc::clone(&cancel);
        let (sender, receiver) = bounded(1);

        let handle = std::thread::spawn(move || {
            let result = work(&worker_cancel);
            // The receiver half only disappears after join, so a failed
            // send can only mean the process is tearing down.
            let _ = sender.send(result);
        });

        Self {
            handle: Some(handle),
            receiver,
            cancel,
            result: None,
        }
    }

    /// Handle to the stop flag, for handing to progress observers.
    pub fn cancel_flag(&self) -> Arc<CancelFlag> {
        Arc::clone(&self.cancel)
    }

    /// Raise the stop flag. The worker keeps running until it polls it.
    pub fn request_stop(&self) {
        self.cancel.request_stop();
    }

    /// Non-blocking readiness test.
    pub fn is_ready(&mut self) -> bool {
        self.pump();
        self.result.is_some()
    }

    /// Take the result if the worker has finished.
    pub fn try_get(&mut self) -> Option<T> {
        self.pump();
        self.result.take()
    }

    /// Block until the worker finishes and return its result.
    ///
    /// A worker panic is re-raised here, mirroring a future that stored the
    /// exception.
    pub fn get(mut self) -> T {
        if let Some(result) = self.try_get() {
            self.join();
            return result;
        }
        match self.receiver.recv() {
            Ok(result) => {
                self.join();
                result
            }
            Err(_) => {
                // The sender was dropped without a value: the worker
                // panicked. Joining surfaces the payload.
                if let Some(handle) = self.handle.take() {
                    if let Err(payload) = handle.join() {
                        std::panic::resume_unwind(payload);
                    }
                }
                unreachable!("worker neither sent a result nor panicked")
            }
        }
    }

    /// Wait up to `timeout` for the result. `Duration::ZERO` is a pure
    /// readiness probe.
    pub fn wait_for(&mut self, timeout: Duration) -> bool {
        if self.is_ready() {
            return true;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => {
                self.result = Some(result);
                true
            }
            Err(_) => false,
        }
    }

    fn pump(&mut self) {
        if self.result.is_none() {
            match self.receiver.try_recv() {
                Ok(result) => self.result = Some(result),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T> Drop for AsyncTask<T> {
    fn drop(&mut self) {
        self.cancel.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_roundtrip() {
        let task = AsyncTask::spawn(|_cancel| 21 * 2);
        assert_eq!(task.get(), 42);
    }

    #[test]
    fn test_wait_for_and_try_get() {
        let mut task = AsyncTask::spawn(|_cancel| {
            std::thread::sleep(Duration::from_millis(20));
            "done"
        });
        assert!(task.wait_for(Duration::from_secs(5)));
        assert_eq!(task.try_get(), Some("done"));
        assert_eq!(task.try_get(), None);
    }

    #[test]
    fn test_cooperative_cancellation() {
        let mut task = AsyncTask::spawn(|cancel| {
            let mut iterations = 0u64;
            while !cancel.is_stop_requested() {
                iterations += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            iterations
        });
        task.request_stop();
        assert!(task.wait_for(Duration::from_secs(5)));
        assert!(task.try_get().is_some());
    }

    #[test]
    fn test_drop_requests_stop_and_joins() {
        let task = AsyncTask::spawn(|cancel| {
            while !cancel.is_stop_requested() {
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        drop(task); // must not hang
    }
}
