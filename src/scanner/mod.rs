pub mod cmdline;
pub mod drives;
pub mod processes;

use std::path::PathBuf;

use processes::ProcessInfo;

pub use drives::{DriveWalker, ExclusionCache};
pub use processes::{ProcLister, ProcessLister, ProcessWatcher};

/// Discrete events published by the process watcher and drive walker.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// New VM runtime processes since the previous snapshot
    VmsAdded(Vec<ProcessInfo>),
    /// VM runtime processes absent from the new snapshot
    VmsGone(Vec<ProcessInfo>),
    /// Daemon instance count went from zero to one or more
    DaemonAppeared,
    /// Daemon instance count went to zero
    DaemonGone,
    /// A VM `Logs` directory with leftover logs was discovered on disk
    LogPathFound(PathBuf),
}
