use std::fs::OpenOptions;
use std::path::Path;

use nix::fcntl::{Flock, FlockArg};

/// Result of probing a file for exclusive access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLockState {
    /// File exists and nothing holds it
    Free,
    /// File exists and another holder denied exclusive access
    Busy,
    /// File does not exist
    Absent,
}

/// Probe for whether a file is exclusively held.
///
/// The drop-files cleaner blocks its first wait phase on this; tests
/// substitute their own implementation.
pub trait LockProbe: Send + Sync {
    fn state(&self, path: &Path) -> FileLockState;
}

/// Production probe: attempts an open plus a non-blocking exclusive
/// `flock`, interpreting any refusal as busy.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlockProbe;

impl LockProbe for FlockProbe {
    fn state(&self, path: &Path) -> FileLockState {
        if !path.exists() {
            return FileLockState::Absent;
        }

        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            // the file exists but would not open for read/write
            Err(_) => return FileLockState::Busy,
        };

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(_lock) => FileLockState::Free, // released on drop
            Err(_) => FileLockState::Busy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn absent_file_reports_absent() {
        let tmp = TempDir::new().unwrap();
        let probe = FlockProbe;
        assert_eq!(
            probe.state(&tmp.path().join("missing")),
            FileLockState::Absent
        );
    }

    #[test]
    fn plain_file_reports_free() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.log");
        fs::write(&path, "data").unwrap();

        let probe = FlockProbe;
        assert_eq!(probe.state(&path), FileLockState::Free);
    }

    #[test]
    fn flocked_file_reports_busy() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("held.log");
        fs::write(&path, "data").unwrap();

        let holder = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let _lock = Flock::lock(holder, FlockArg::LockExclusiveNonblock).unwrap();

        let probe = FlockProbe;
        assert_eq!(probe.state(&path), FileLockState::Busy);
    }
}
