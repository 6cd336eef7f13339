use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::delay::sleep_through;

/// Supervised background tasks tracked by a counter so shutdown can drain
/// them deterministically instead of relying on unobserved completion.
#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    active: Arc<AtomicUsize>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a detached worker. The counter is incremented before the
    /// thread starts and decremented when the closure returns, panics
    /// included.
    pub fn spawn<F>(&self, name: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.active.fetch_add(1, Ordering::SeqCst);
        let active = Arc::clone(&self.active);

        let result = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _decrement = CounterGuard(active);
            f();
        });

        if let Err(e) = result {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Failed to spawn task '{}': {}", name, e);
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Block until every spawned task has finished.
    pub fn wait_idle(&self, poll: Duration) {
        while self.active() > 0 {
            sleep_through(poll);
        }
    }
}

struct CounterGuard(Arc<AtomicUsize>);

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
