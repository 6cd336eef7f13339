use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{PathsConfig, RootLogConfig};
use crate::io::secure_delete;
use crate::util::delay::{sleep_through, ShutdownToken};
use crate::util::retry::{retry_unbounded, RetryPolicy};
use crate::util::TaskGroup;

use super::paths;

/// Cleans the root-level product log files under the per-user
/// configuration directories.
///
/// Runs at startup and whenever the daemon's last instance exits. On
/// shutdown, a failed bounded pass falls into a final retry loop that by
/// default runs until the logs are gone; the configured shutdown timeout
/// bounds it when operators prefer a guaranteed exit.
#[derive(Clone)]
pub struct RootLogCleaner {
    config: RootLogConfig,
    paths_config: PathsConfig,
    has_logs: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    tasks: TaskGroup,
    token: ShutdownToken,
}

impl RootLogCleaner {
    pub fn new(config: RootLogConfig, paths_config: PathsConfig, token: ShutdownToken) -> Self {
        Self {
            config,
            paths_config,
            has_logs: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
            tasks: TaskGroup::new(),
            token,
        }
    }

    /// Single synchronous pass at service start; remembers whether logs
    /// remain.
    pub fn startup_clean(&self) {
        let ok = self.delete_root_logs();
        self.has_logs.store(!ok, Ordering::SeqCst);
    }

    /// A running daemon writes root logs again.
    pub fn on_daemon_appeared(&self) {
        self.has_logs.store(true, Ordering::SeqCst);
    }

    /// Last daemon instance exited: start a deletion pass, unless one is
    /// already in flight.
    pub fn on_daemon_gone(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::debug!("Root log pass already in flight");
            return;
        }

        let cleaner = self.clone();
        self.tasks.spawn("root-log-clean", move || {
            let ok = cleaner.run_pass_with(|| cleaner.delete_root_logs());
            cleaner.has_logs.store(!ok, Ordering::SeqCst);
            cleaner.busy.store(false, Ordering::SeqCst);
        });
    }

    /// Bounded attempts, then, only when shutdown was requested and the
    /// logs are still there, the final retry loop.
    fn run_pass_with<F>(&self, mut op: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let policy = RetryPolicy::new(
            self.config.max_attempts,
            Duration::from_millis(self.config.retry_delay_ms),
            Duration::from_millis(self.config.drain_interval_ms),
        );
        let mut ok = policy.run(&self.token, &mut op);
        tracing::info!("..deleting root logs: {}", if ok { "OK" } else { "failed" });

        if !ok && self.token.is_cancelled() {
            tracing::info!("..deleting root logs: extra try-outs on shutdown");
            let deadline = self
                .config
                .shutdown_timeout()
                .map(|timeout| Instant::now() + timeout);
            ok = retry_unbounded(
                Duration::from_millis(self.config.drain_interval_ms),
                deadline,
                op,
            );
            tracing::info!(
                "..deleting root logs: {}",
                if ok { "done" } else { "gave up at the shutdown timeout" }
            );
        }

        ok
    }

    /// Secure-delete every log file in every root configuration
    /// directory. Aggregate success requires all of them to go.
    fn delete_root_logs(&self) -> bool {
        let mut total_result = true;

        for dir in paths::root_log_dirs(&self.paths_config) {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Cannot list '{}': {}", dir.display(), e);
                    total_result = false;
                    continue;
                }
            };

            for entry in entries.flatten() {
                let file = entry.path();
                let is_log = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(".log"));
                if !file.is_file() || !is_log {
                    continue;
                }

                let ok = secure_delete(&file);
                tracing::info!(
                    "  ..deleting {}: {}",
                    file.display(),
                    if ok { "OK" } else { "failed" }
                );
                total_result &= ok;
            }
        }

        total_result
    }

    /// Drain: let any in-flight pass finish, then run the final pass here
    /// when logs remain. The daemon-gone event that normally triggers a
    /// pass may never arrive once shutdown was requested, so waiting on
    /// the flag alone would hang with a still-running daemon.
    /// Only meaningful once shutdown was requested.
    pub fn wait_termination(&self) {
        tracing::info!("Root log cleaner draining");
        if !self.token.is_cancelled() {
            return;
        }

        let deadline = self
            .config
            .shutdown_timeout()
            .map(|timeout| Instant::now() + timeout);

        while self.tasks.active() > 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::warn!("Root log drain abandoned at the shutdown timeout");
                    return;
                }
            }
            sleep_through(Duration::from_millis(self.config.drain_interval_ms));
        }

        if self.has_logs.load(Ordering::SeqCst) {
            let ok = self.run_pass_with(|| self.delete_root_logs());
            self.has_logs.store(!ok, Ordering::SeqCst);
        }
        tracing::info!("Root log cleaner drained");
    }

    #[cfg(test)]
    pub(crate) fn wait_tasks(&self) {
        self.tasks.wait_idle(Duration::from_millis(5));
    }
}
