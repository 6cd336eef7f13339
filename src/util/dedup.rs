use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Concurrency-safe set enforcing at most one active cleanup task per path.
///
/// `acquire` admits exactly one caller per path until the returned guard is
/// dropped; losers must not start a duplicate task. The same path is
/// acquirable again after release.
#[derive(Debug, Clone, Default)]
pub struct PathDedupSet {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathDedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for a cleanup task. Returns `None` when another task
    /// already owns it.
    pub fn acquire(&self, path: &Path) -> Option<DedupGuard> {
        let mut paths = self.paths.lock().unwrap();
        if paths.insert(path.to_path_buf()) {
            Some(DedupGuard {
                set: Arc::clone(&self.paths),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().unwrap().is_empty()
    }
}

/// Ownership of a path in a [`PathDedupSet`]; released on drop so a task
/// cannot leak its claim on any exit path.
#[derive(Debug)]
pub struct DedupGuard {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for DedupGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn acquire_then_release() {
        let set = PathDedupSet::new();
        let path = Path::new("/tmp/x");

        let guard = set.acquire(path).unwrap();
        assert!(set.acquire(path).is_none());
        assert_eq!(set.len(), 1);

        drop(guard);
        assert!(set.is_empty());
        assert!(set.acquire(path).is_some());
    }

    #[test]
    fn distinct_paths_are_independent() {
        let set = PathDedupSet::new();
        let _a = set.acquire(Path::new("/a")).unwrap();
        let _b = set.acquire(Path::new("/b")).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn exactly_one_concurrent_winner() {
        let set = PathDedupSet::new();
        let winners = Arc::new(AtomicUsize::new(0));

        thread::scope(|s| {
            for _ in 0..16 {
                let set = set.clone();
                let winners = Arc::clone(&winners);
                s.spawn(move || {
                    if let Some(_guard) = set.acquire(Path::new("/contested")) {
                        winners.fetch_add(1, Ordering::SeqCst);
                        // hold the claim until every loser has tried
                        thread::sleep(std::time::Duration::from_millis(50));
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }
}
