/// Progress reporting for per-sequence scheduling
use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receives `(message, completed, total)` updates. Purely observational.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, completed: usize, total: usize);
}

/// Logs every update at debug level and the final one at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, message: &str, completed: usize, total: usize) {
        if completed == total {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _message: &str, _completed: usize, _total: usize) {}
}

/// Keeps every update; useful for tests and embedding applications
#[derive(Debug, Default)]
pub struct CollectingProgress {
    updates: Mutex<Vec<(String, usize, usize)>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(String, usize, usize)> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for CollectingProgress {
    fn report(&self, message: &str, completed: usize, total: usize) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((message.to_string(), completed, total));
        }
    }
}

/// Started/completed counters shared by the tasks of one operation
#[derive(Debug, Default)]
pub struct TaskCounters {
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl TaskCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a task as started; returns the new total
    pub fn start(&self) -> usize {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count a task as completed; returns the new total
    pub fn complete(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// "(i/total)" status suffix
pub fn status(completed: usize, total: usize) -> String {
    format!("({completed}/{total})")
}
