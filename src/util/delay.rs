use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Shared cancellation flag fanned out to every watcher and cleaner.
///
/// Cancellation is a request to drain, not an abort: components keep
/// running until their in-flight work reaches zero, but switch to their
/// short drain delays so the shutdown sequence completes quickly.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sleep granularity so cancellation takes effect promptly
const CHUNK: Duration = Duration::from_millis(25);

/// Sleep up to `duration`, returning early once `token` is cancelled.
pub fn sleep_cancellable(token: &ShutdownToken, duration: Duration) {
    let mut remaining = duration;
    while remaining > Duration::ZERO && !token.is_cancelled() {
        let step = remaining.min(CHUNK);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

/// Plain sleep that ignores cancellation. Used for the short drain delays
/// that must still pace loops after shutdown was requested.
pub fn sleep_through(duration: Duration) {
    thread::sleep(duration);
}

/// The escalating sleep every retry loop uses: a full cancellable `normal`
/// sleep before shutdown was requested, a short plain `after_cancel` sleep
/// after.
pub fn sleep_escalating(token: &ShutdownToken, normal: Duration, after_cancel: Duration) {
    if token.is_cancelled() {
        sleep_through(after_cancel);
    } else {
        sleep_cancellable(token, normal);
    }
}
