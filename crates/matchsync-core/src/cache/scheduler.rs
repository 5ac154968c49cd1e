//! When deferred cache writes actually reach durable storage.

use std::time::Duration;

use parking_lot::Mutex;

pub type FlushTask = Box<dyn FnOnce() + Send + 'static>;

pub trait FlushScheduler: Send + Sync {
    fn schedule(&self, task: FlushTask);
}

/// Runs the flush after a short idle delay on the current tokio runtime.
///
/// Outside a runtime there is nothing to defer onto, so the flush runs inline.
#[derive(Debug, Clone)]
pub struct DeferredScheduler {
    delay: Duration,
}

impl DeferredScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl FlushScheduler for DeferredScheduler {
    fn schedule(&self, task: FlushTask) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let delay = self.delay;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    task();
                });
            }
            Err(_) => task(),
        }
    }
}

/// Holds flushes until the caller runs them.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<FlushTask>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run every queued flush, returning how many ran.
    pub fn run_pending(&self) -> usize {
        let tasks = std::mem::take(&mut *self.pending.lock());
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule(&self, task: FlushTask) {
        self.pending.lock().push(task);
    }
}
