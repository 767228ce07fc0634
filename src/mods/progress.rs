//! Transfer progress channel
//!
//! The engine publishes into a state struct behind a mutex and bumps a
//! version counter; the UI polls a snapshot each frame and redraws only
//! when the version moved. Nothing is sent per file across threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters and strings a transfer task exposes to the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    pub total_files: usize,
    pub files_done: usize,
    pub current_file: String,
    /// Intra-file percentage, only meaningful for large files mid-copy.
    pub file_percent: f32,
    pub overall_percent: f32,
    pub bytes_total: u64,
    pub bytes_done: u64,
    pub completed: bool,
    /// Final user-visible message when non-empty.
    pub error_message: String,
}

/// Mutex-plus-version progress publication.
#[derive(Debug, Default)]
pub struct ProgressChannel {
    state: Mutex<ProgressState>,
    version: AtomicU64,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the state under the lock and advance the version.
    pub fn publish(&self, update: impl FnOnce(&mut ProgressState)) {
        let mut state = self.state.lock().unwrap();
        update(&mut state);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Current version; unchanged means no redraw needed.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.lock().unwrap().clone()
    }

    /// Reset for a fresh task.
    pub fn reset(&self) {
        self.publish(|state| *state = ProgressState::default());
    }

    /// Terminal publication: success when `error` is `None`.
    pub fn finish(&self, error: Option<String>) {
        self.publish(|state| {
            state.completed = true;
            state.error_message = error.unwrap_or_default();
        });
    }
}
