use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::VmLogConfig;
use crate::io::secure_delete;
use crate::scanner::cmdline::log_dir_from_cmdline;
use crate::scanner::processes::ProcessInfo;
use crate::util::delay::{sleep_through, ShutdownToken};
use crate::util::{RetryPolicy, TaskGroup};

use super::paths;

/// Cleans per-VM `Logs` directories when their owning process exits, or
/// when the drive walker discovers logs no running VM owns.
///
/// The watched map (log directory -> owning pid) is mutated only from
/// watcher events; a path is a member iff its owner is believed alive.
#[derive(Clone)]
pub struct VmLogCleaner {
    config: VmLogConfig,
    watched: Arc<Mutex<HashMap<PathBuf, i32>>>,
    tasks: TaskGroup,
    token: ShutdownToken,
}

impl VmLogCleaner {
    pub fn new(config: VmLogConfig, token: ShutdownToken) -> Self {
        Self {
            config,
            watched: Arc::new(Mutex::new(HashMap::new())),
            tasks: TaskGroup::new(),
            token,
        }
    }

    /// Record the log directory of each newly appeared VM process.
    pub fn on_vms_added(&self, procs: &[ProcessInfo]) {
        let mut watched = self.watched.lock().unwrap();
        for proc in procs {
            let Some(dir) = log_dir_from_cmdline(&proc.cmdline) else {
                tracing::debug!("No log argument for pid {}", proc.pid);
                continue;
            };
            if let std::collections::hash_map::Entry::Vacant(entry) = watched.entry(dir) {
                tracing::debug!("Watching '{}' for pid {}", entry.key().display(), proc.pid);
                entry.insert(proc.pid);
            }
        }
    }

    /// A discovered on-disk log path: clean it unless a live VM owns it.
    pub fn on_log_path_found(&self, path: &Path) {
        if self.watched.lock().unwrap().contains_key(path) {
            tracing::debug!("'{}' belongs to a running VM", path.display());
            return;
        }
        self.spawn_delete(path.to_path_buf());
    }

    /// Remove the mapping for each exited VM and clean its logs. Returns
    /// true when no tracked VMs remain, so the caller can trigger the
    /// drop-files pass on the transition to zero.
    pub fn on_vms_gone(&self, procs: &[ProcessInfo]) -> bool {
        for proc in procs {
            let path = {
                let mut watched = self.watched.lock().unwrap();
                let path = watched
                    .iter()
                    .find(|(_, &pid)| pid == proc.pid)
                    .map(|(path, _)| path.clone());
                if let Some(ref path) = path {
                    // unwatch no matter whether the deletion succeeds
                    watched.remove(path);
                }
                path
            };

            match path {
                Some(path) => self.spawn_delete(path),
                None => tracing::debug!("No logs tracked for pid {}", proc.pid),
            }
        }

        self.watched.lock().unwrap().is_empty()
    }

    fn spawn_delete(&self, path: PathBuf) {
        let cleaner = self.clone();
        self.tasks.spawn("vm-log-clean", move || {
            let policy = RetryPolicy::new(
                cleaner.config.max_attempts,
                Duration::from_millis(cleaner.config.retry_delay_ms),
                Duration::from_millis(cleaner.config.drain_interval_ms),
            );
            let ok = policy.run(&cleaner.token, || delete_vm_logs(&path));
            tracing::info!(
                "..deleting logs in '{}': {}",
                path.display(),
                if ok { "OK" } else { "failed" }
            );
        });
    }

    /// Block until every in-flight deletion finished and nothing is
    /// watched anymore. Only meaningful once shutdown was requested.
    pub fn wait_termination(&self) {
        tracing::info!("VM log cleaner draining");
        if !self.token.is_cancelled() {
            return;
        }
        while self.tasks.active() > 0 || !self.watched.lock().unwrap().is_empty() {
            tracing::debug!(
                "VM log drain: {} tasks, {} watched paths",
                self.tasks.active(),
                self.watched.lock().unwrap().len()
            );
            sleep_through(Duration::from_millis(self.config.drain_interval_ms));
        }
        tracing::info!("VM log cleaner drained");
    }

    #[cfg(test)]
    pub(crate) fn wait_tasks(&self) {
        self.tasks.wait_idle(Duration::from_millis(5));
    }

    #[cfg(test)]
    pub(crate) fn watched_snapshot(&self) -> HashMap<PathBuf, i32> {
        self.watched.lock().unwrap().clone()
    }
}

/// Secure-delete every product log in `path`. Aggregate success requires
/// every matched file to go; an absent directory is a success.
fn delete_vm_logs(path: &Path) -> bool {
    if !path.is_dir() {
        tracing::debug!("Path '{}' doesn't exist", path.display());
        return true;
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot list '{}': {}", path.display(), e);
            return false;
        }
    };

    let mut total_result = true;
    for entry in entries.flatten() {
        let file = entry.path();
        if !paths::is_vbox_log(&file) {
            continue;
        }
        let ok = secure_delete(&file);
        tracing::info!(
            "..deleting {}: {}",
            file.display(),
            if ok { "OK" } else { "failed" }
        );
        total_result &= ok;
    }

    total_result
}
