//! Cooperative cancellation and progress reporting.
//!
//! A [`TaskMonitor`] is threaded through every long-running loader call and
//! polled at well-defined points (the start of each artifact and before each
//! naming retry). Cancellation is never preemptive. A monitor may also carry
//! a deadline, which reports as cancellation once it passes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{LoaderError, Result};

/// Cancellation flag plus progress counters, shareable across threads.
#[derive(Debug)]
pub struct TaskMonitor {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    progress: AtomicU64,
    maximum: AtomicU64,
    message: Mutex<String>,
}

impl Default for TaskMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskMonitor {
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            deadline: None,
            progress: AtomicU64::new(0),
            maximum: AtomicU64::new(0),
            message: Mutex::new(String::new()),
        }
    }

    /// A monitor that reports cancellation once `limit` has elapsed.
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + limit),
            ..Self::new()
        }
    }

    /// Request cancellation. Observed at the next poll point.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Cancellation requested");
        }
    }

    pub fn clear_cancelled(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!("Deadline passed; treating as cancellation");
                self.cancelled.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// `Err(LoaderError::Cancelled)` once cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LoaderError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn set_message(&self, message: &str) {
        debug!(message, "Progress");
        if let Ok(mut m) = self.message.lock() {
            m.clear();
            m.push_str(message);
        }
    }

    pub fn message(&self) -> String {
        self.message.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn set_maximum(&self, maximum: u64) {
        self.maximum.store(maximum, Ordering::Relaxed);
        self.progress.store(0, Ordering::Relaxed);
    }

    pub fn maximum(&self) -> u64 {
        self.maximum.load(Ordering::Relaxed)
    }

    pub fn increment_progress(&self, by: u64) {
        self.progress.fetch_add(by, Ordering::Relaxed);
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }
}
