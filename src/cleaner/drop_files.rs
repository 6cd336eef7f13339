use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DropConfig, PathsConfig};
use crate::io::lock::{FileLockState, LockProbe};
use crate::io::secure_delete;
use crate::util::delay::{sleep_cancellable, sleep_escalating, sleep_through, ShutdownToken};
use crate::util::{PathDedupSet, TaskGroup};

use super::paths;

/// Cleans up drag-and-drop temp folders once the files inside stop being
/// held by the copy that put them there.
///
/// Each candidate subdirectory gets one independent deletion task,
/// deduplicated per path: wait until every file is unlocked, wait a grace
/// period for the external copy to finalize, then delete with bounded
/// retries.
#[derive(Clone)]
pub struct DropCleaner {
    config: DropConfig,
    paths_config: PathsConfig,
    probe: Arc<dyn LockProbe>,
    dedup: PathDedupSet,
    tasks: TaskGroup,
    token: ShutdownToken,
}

impl DropCleaner {
    pub fn new(
        config: DropConfig,
        paths_config: PathsConfig,
        probe: Arc<dyn LockProbe>,
        token: ShutdownToken,
    ) -> Self {
        Self {
            config,
            paths_config,
            probe,
            dedup: PathDedupSet::new(),
            tasks: TaskGroup::new(),
            token,
        }
    }

    /// Start a deletion task for every immediate subdirectory of every
    /// drop folder. Returns while the tasks still run.
    pub fn clean(&self) {
        tracing::info!("Drop cleanup pass");

        for root in paths::drop_roots(&self.paths_config, &self.config.drop_dir) {
            tracing::debug!("Drop folder: {}", root.display());
            match fs::read_dir(&root) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        let path = entry.path();
                        if path.is_dir() {
                            self.spawn_task(path);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Cannot list drop folder '{}': {}", root.display(), e);
                }
            }
        }
    }

    fn spawn_task(&self, path: PathBuf) {
        let Some(guard) = self.dedup.acquire(&path) else {
            tracing::debug!(
                "Skipping '{}': a cleanup task already owns it",
                path.display()
            );
            return;
        };

        let cleaner = self.clone();
        self.tasks.spawn("drop-clean", move || {
            let _guard = guard; // held for the task's entire lifetime
            let ok = cleaner.try_delete_path(&path);
            tracing::info!(
                "Drop cleanup of '{}': {}",
                path.display(),
                if ok { "OK" } else { "failed" }
            );
        });
    }

    /// The deletion task body: wait-until-unlocked, grace period, then a
    /// bounded delete loop. Success means the directory is gone.
    fn try_delete_path(&self, path: &Path) -> bool {
        while !self.every_file_free(path) {
            self.inner_sleep();
        }

        // The OS copies files from the drop folder to their destination
        // with some delay, which can stretch while the user answers an
        // overwrite prompt. Give that copy time to finish.
        sleep_cancellable(&self.token, Duration::from_secs(self.config.grace_period_secs));

        let mut attempts = 0;
        while path.is_dir() && attempts < self.config.max_attempts {
            attempts += 1;
            self.delete_iteration(path);
            if path.is_dir() {
                self.inner_sleep();
            }
        }

        !path.exists()
    }

    /// One pass over the directory: remove it if empty, otherwise
    /// secure-delete every file in it.
    fn delete_iteration(&self, path: &Path) {
        let files: Vec<PathBuf> = match fs::read_dir(path) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect(),
            Err(e) => {
                tracing::warn!("Delete pass on '{}' failed: {}", path.display(), e);
                return;
            }
        };

        if files.is_empty() {
            if let Err(e) = fs::remove_dir(path) {
                tracing::warn!("Cannot remove '{}': {}", path.display(), e);
            }
            return;
        }

        for file in files {
            let name = file
                .file_name()
                .map(|n| paths::masked_name(&n.to_string_lossy()))
                .unwrap_or_default();
            let size_mb = fs::metadata(&file)
                .map(|m| m.len() as f64 / 1024.0 / 1024.0)
                .unwrap_or(0.0);

            let ok = secure_delete(&file);
            tracing::info!(
                "..deleting '{}', size = {:.2} MB: {}",
                name,
                size_mb,
                if ok { "OK" } else { "failed" }
            );
        }
    }

    /// Whether every file in `path` is free of exclusive holders. An
    /// absent directory or a failed listing counts as free so the task
    /// can proceed to the delete loop.
    fn every_file_free(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return true;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Lock poll on '{}' failed: {}", path.display(), e);
                return true;
            }
        };

        for entry in entries.flatten() {
            let file = entry.path();
            if file.is_file() && self.probe.state(&file) == FileLockState::Busy {
                return false;
            }
        }
        true
    }

    fn inner_sleep(&self) {
        sleep_escalating(
            &self.token,
            Duration::from_millis(self.config.poll_interval_ms),
            Duration::from_millis(self.config.drain_interval_ms),
        );
    }

    /// Final pass plus drain: run one more cleanup over the drop folders,
    /// then block until every in-flight task has released its path.
    pub fn shutdown(&self) {
        tracing::info!("Drop cleaner draining");
        self.clean();
        while !self.dedup.is_empty() {
            sleep_through(Duration::from_millis(self.config.drain_interval_ms));
        }
        tracing::info!("Drop cleaner drained");
    }

    #[cfg(test)]
    pub(crate) fn wait_tasks(&self) {
        self.tasks.wait_idle(Duration::from_millis(5));
    }
}
