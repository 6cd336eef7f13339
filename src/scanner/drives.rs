use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::cleaner::paths::has_vbox_logs;
use crate::config::WalkerConfig;
use crate::util::delay::{sleep_cancellable, ShutdownToken};

use super::ScanEvent;

/// Subtrees already rejected under a scan root, so repeat scans skip
/// unreadable or irrelevant directories without re-reading them.
///
/// Cleared wholesale on a fixed period to self-heal from transient
/// permission failures and newly granted access.
#[derive(Debug)]
pub struct ExclusionCache {
    rejected: Mutex<HashMap<PathBuf, HashSet<PathBuf>>>,
    stamp: Mutex<Instant>,
    reset_after: Duration,
}

impl ExclusionCache {
    pub fn new(reset_after: Duration) -> Self {
        Self {
            rejected: Mutex::new(HashMap::new()),
            stamp: Mutex::new(Instant::now()),
            reset_after,
        }
    }

    /// Record `path` as rejected under `root`. Empty keys or values signal
    /// a programming defect, not an operational condition.
    pub fn insert(&self, root: &Path, path: &Path) {
        assert!(!root.as_os_str().is_empty(), "exclusion root must not be empty");
        assert!(!path.as_os_str().is_empty(), "excluded path must not be empty");

        self.rejected
            .lock()
            .unwrap()
            .entry(root.to_path_buf())
            .or_default()
            .insert(path.to_path_buf());
    }

    pub fn contains(&self, root: &Path, path: &Path) -> bool {
        self.rejected
            .lock()
            .unwrap()
            .get(root)
            .is_some_and(|set| set.contains(path))
    }

    /// Clear everything once the reset period has elapsed.
    pub fn maybe_reset(&self) {
        let mut stamp = self.stamp.lock().unwrap();
        let age = stamp.elapsed();
        if age >= self.reset_after {
            *stamp = Instant::now();
            let mut rejected = self.rejected.lock().unwrap();
            let dropped: usize = rejected.values().map(HashSet::len).sum();
            rejected.clear();
            tracing::info!(
                "Exclusion cache cleared after {:?} ({} entries dropped)",
                age,
                dropped
            );
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.rejected.lock().unwrap().values().map(HashSet::len).sum()
    }
}

/// Periodically walks every real drive looking for VM working directories
/// with leftover logs, publishing a [`ScanEvent::LogPathFound`] per hit.
pub struct DriveWalker {
    config: WalkerConfig,
    cache: ExclusionCache,
    events: Sender<ScanEvent>,
    token: ShutdownToken,
}

impl DriveWalker {
    pub fn new(config: WalkerConfig, events: Sender<ScanEvent>, token: ShutdownToken) -> Self {
        let cache = ExclusionCache::new(Duration::from_secs(
            config.exclusion_reset_hours * 3600,
        ));
        Self {
            config,
            cache,
            events,
            token,
        }
    }

    pub fn run(&self) {
        sleep_cancellable(&self.token, Duration::from_secs(self.config.start_delay_secs));

        while !self.token.is_cancelled() {
            self.cache.maybe_reset();
            self.scan_drives();
            sleep_cancellable(
                &self.token,
                Duration::from_secs(self.config.scan_interval_secs),
            );
        }

        tracing::info!("Drive walker stopped");
    }

    /// Walk every mount root concurrently and await all walks.
    fn scan_drives(&self) {
        let roots = match mount_roots() {
            Ok(roots) => roots,
            Err(e) => {
                tracing::warn!("Mount enumeration failed: {}", e);
                return;
            }
        };

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(roots.len().max(1))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("Failed to build scan pool: {}", e);
                return;
            }
        };

        let tagged: Vec<_> = roots
            .into_iter()
            .map(|root| (root, self.events.clone()))
            .collect();

        pool.install(|| {
            tagged.into_par_iter().for_each(|(root, events)| {
                walk_root(&root, &self.config, &self.cache, &self.token, &events);
            });
        });
    }

    /// Single-root walk, exposed for tests.
    pub fn walk_single_root(&self, root: &Path) {
        walk_root(root, &self.config, &self.cache, &self.token, &self.events);
    }
}

/// Iterative breadth-first walk from `root` with an explicit queue, so the
/// stack stays bounded and cancellation checks land between directories.
fn walk_root(
    root: &Path,
    config: &WalkerConfig,
    cache: &ExclusionCache,
    token: &ShutdownToken,
    events: &Sender<ScanEvent>,
) {
    tracing::debug!("Scanning {}", root.display());

    let mut queue = VecDeque::new();
    queue.push_back(root.to_path_buf());
    let mut visited: u64 = 0;

    while let Some(dir) = queue.pop_front() {
        if token.is_cancelled() {
            break;
        }
        if cache.contains(root, &dir) {
            continue;
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => {
                // commonly permission denied; remember and move on
                cache.insert(root, &dir);
                continue;
            }
        };

        let mut has_marker = false;
        for entry in entries.flatten() {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };

            if file_type.is_dir() {
                queue.push_back(path);
            } else if path.extension().is_some_and(|ext| ext == "vbox") {
                has_marker = true;
            }
        }

        if has_marker && has_vbox_logs(&dir) {
            let logs = dir.join("Logs");
            tracing::info!("Found VM logs in {}", logs.display());
            if events.send(ScanEvent::LogPathFound(logs)).is_err() {
                tracing::debug!("Event receiver dropped; stopping walk");
                break;
            }
        }

        visited += 1;
        if visited % config.yield_every == 0 {
            sleep_cancellable(token, Duration::from_millis(config.yield_ms));
        }
    }

    tracing::debug!("Scan of {} finished, {} directories", root.display(), visited);
}

/// Real (non-virtual) mount points to use as scan roots.
pub fn mount_roots() -> std::io::Result<Vec<PathBuf>> {
    let file = File::open("/proc/mounts")?;
    let reader = BufReader::new(file);

    let mut roots = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let device = parts[0];
        let mount_point = parts[1];
        let fs_type = parts[2];

        if is_virtual_filesystem(fs_type, device, mount_point) {
            continue;
        }

        roots.push(PathBuf::from(mount_point));
    }

    Ok(roots)
}

/// Check if a filesystem type is virtual (not real disk)
fn is_virtual_filesystem(fs_type: &str, device: &str, mount_point: &str) -> bool {
    const VIRTUAL_FS: &[&str] = &[
        "proc",
        "sysfs",
        "devtmpfs",
        "devpts",
        "tmpfs",
        "securityfs",
        "cgroup",
        "cgroup2",
        "pstore",
        "debugfs",
        "hugetlbfs",
        "mqueue",
        "fusectl",
        "configfs",
        "binfmt_misc",
        "autofs",
        "efivarfs",
        "tracefs",
        "bpf",
        "overlay",
        "squashfs",
        "nsfs",
        "ramfs",
    ];

    if VIRTUAL_FS.contains(&fs_type) {
        return true;
    }

    if mount_point.starts_with("/snap/") {
        return true;
    }

    if mount_point.starts_with("/var/lib/docker/") {
        return true;
    }

    // Skip virtual devices, keeping network mounts like NFS
    if !device.starts_with('/') && device != "none" && !device.contains(':') {
        return true;
    }

    false
}
