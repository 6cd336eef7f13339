use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use crate::config::WatcherConfig;
use crate::util::delay::{sleep_escalating, ShutdownToken};

use super::ScanEvent;

/// A matching OS process captured during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub cmdline: String,
}

/// Enumerate processes by executable name.
///
/// Seam for tests; production reads `/proc`.
pub trait ProcessLister: Send + Sync {
    fn list_by_name(&self, name: &str) -> Vec<ProcessInfo>;
}

/// `/proc`-based lister: matches `comm` against the wanted name and
/// captures the NUL-separated `cmdline` as a single string.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcLister;

impl ProcessLister for ProcLister {
    fn list_by_name(&self, name: &str) -> Vec<ProcessInfo> {
        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(e) => {
                // treated as an empty snapshot for this cycle, never fatal
                tracing::warn!("Process enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let mut processes = Vec::new();

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(pid) = file_name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
                continue;
            };

            let comm = match fs::read_to_string(entry.path().join("comm")) {
                Ok(comm) => comm,
                Err(_) => continue, // raced with process exit
            };
            // comm is truncated by the kernel to 15 bytes
            let comm = comm.trim_end();
            if comm != name && !(name.len() > 15 && Some(comm) == name.get(..15)) {
                continue;
            }

            let cmdline = fs::read(entry.path().join("cmdline"))
                .map(|raw| {
                    raw.split(|&b| b == 0)
                        .filter(|part| !part.is_empty())
                        .map(|part| String::from_utf8_lossy(part).into_owned())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();

            processes.push(ProcessInfo { pid, cmdline });
        }

        processes
    }
}

/// Periodically snapshots the VM runtime and daemon processes, diffs
/// against the previous snapshot by pid, and publishes transitions.
///
/// After cancellation the loop keeps polling at the drain interval until
/// both tracked lists are empty, so no exit transition is missed during
/// shutdown.
pub struct ProcessWatcher {
    lister: Arc<dyn ProcessLister>,
    events: Sender<ScanEvent>,
    token: ShutdownToken,
    vm_name: String,
    daemon_name: String,
    poll_interval: Duration,
    drain_interval: Duration,
    vm_procs: Vec<ProcessInfo>,
    daemon_procs: Vec<ProcessInfo>,
}

impl ProcessWatcher {
    pub fn new(
        config: &WatcherConfig,
        lister: Arc<dyn ProcessLister>,
        events: Sender<ScanEvent>,
        token: ShutdownToken,
    ) -> Self {
        Self {
            lister,
            events,
            token,
            vm_name: config.vm_process.clone(),
            daemon_name: config.daemon_process.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            drain_interval: Duration::from_millis(config.drain_interval_ms),
            vm_procs: Vec::new(),
            daemon_procs: Vec::new(),
        }
    }

    pub fn run(&mut self) {
        while !self.token.is_cancelled()
            || !self.vm_procs.is_empty()
            || !self.daemon_procs.is_empty()
        {
            self.poll();
            sleep_escalating(&self.token, self.poll_interval, self.drain_interval);
        }
        tracing::info!("Process watcher stopped");
    }

    /// One poll cycle: snapshot, diff, emit.
    pub fn poll(&mut self) {
        let vm_snapshot = self.lister.list_by_name(&self.vm_name);
        self.update_vms(vm_snapshot);

        let daemon_snapshot = self.lister.list_by_name(&self.daemon_name);
        self.update_daemon(daemon_snapshot);
    }

    fn update_vms(&mut self, snapshot: Vec<ProcessInfo>) {
        let (added, gone) = diff_by_pid(&self.vm_procs, &snapshot);
        self.vm_procs = snapshot;

        if !gone.is_empty() {
            tracing::debug!("VM processes gone: {:?}", pids(&gone));
            self.emit(ScanEvent::VmsGone(gone));
        }
        if !added.is_empty() {
            tracing::debug!("VM processes added: {:?}", pids(&added));
            self.emit(ScanEvent::VmsAdded(added));
        }
    }

    fn update_daemon(&mut self, snapshot: Vec<ProcessInfo>) {
        let (added, _gone) = diff_by_pid(&self.daemon_procs, &snapshot);

        // only the zero transitions matter for the daemon
        if self.daemon_procs.is_empty() && !added.is_empty() {
            tracing::info!("Daemon '{}' appeared", self.daemon_name);
            self.emit(ScanEvent::DaemonAppeared);
        }
        if !self.daemon_procs.is_empty() && snapshot.is_empty() {
            tracing::info!("Daemon '{}' gone", self.daemon_name);
            self.emit(ScanEvent::DaemonGone);
        }

        self.daemon_procs = snapshot;
    }

    fn emit(&self, event: ScanEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped; discarding scan event");
        }
    }
}

/// Disjoint added/gone sets, by process-id identity.
fn diff_by_pid(
    old: &[ProcessInfo],
    new: &[ProcessInfo],
) -> (Vec<ProcessInfo>, Vec<ProcessInfo>) {
    let added = new
        .iter()
        .filter(|n| !old.iter().any(|o| o.pid == n.pid))
        .cloned()
        .collect();
    let gone = old
        .iter()
        .filter(|o| !new.iter().any(|n| n.pid == o.pid))
        .cloned()
        .collect();
    (added, gone)
}

fn pids(procs: &[ProcessInfo]) -> Vec<i32> {
    procs.iter().map(|p| p.pid).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn proc_info(pid: i32) -> ProcessInfo {
        ProcessInfo {
            pid,
            cmdline: String::new(),
        }
    }

    /// Lister returning scripted snapshots, one per call and per name.
    struct ScriptedLister {
        vm: Mutex<Vec<Vec<ProcessInfo>>>,
        daemon: Mutex<Vec<Vec<ProcessInfo>>>,
    }

    impl ScriptedLister {
        fn new(vm: Vec<Vec<ProcessInfo>>, daemon: Vec<Vec<ProcessInfo>>) -> Self {
            Self {
                vm: Mutex::new(vm),
                daemon: Mutex::new(daemon),
            }
        }
    }

    impl ProcessLister for ScriptedLister {
        fn list_by_name(&self, name: &str) -> Vec<ProcessInfo> {
            let queue = if name == "VirtualBoxVM" { &self.vm } else { &self.daemon };
            let mut queue = queue.lock().unwrap();
            if queue.is_empty() {
                Vec::new()
            } else {
                queue.remove(0)
            }
        }
    }

    fn watcher_with(
        lister: ScriptedLister,
    ) -> (ProcessWatcher, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel();
        let watcher = ProcessWatcher::new(
            &WatcherConfig::default(),
            Arc::new(lister),
            tx,
            ShutdownToken::new(),
        );
        (watcher, rx)
    }

    #[test]
    fn diff_detects_added_and_gone() {
        let old = vec![proc_info(1), proc_info(2)];
        let new = vec![proc_info(2), proc_info(3)];

        let (added, gone) = diff_by_pid(&old, &new);
        assert_eq!(pids(&added), vec![3]);
        assert_eq!(pids(&gone), vec![1]);
    }

    #[test]
    fn diff_of_identical_snapshots_is_empty() {
        let procs = vec![proc_info(1), proc_info(2)];
        let (added, gone) = diff_by_pid(&procs, &procs);
        assert!(added.is_empty());
        assert!(gone.is_empty());
    }

    #[test]
    fn emits_transition_events_exactly_once() {
        let lister = ScriptedLister::new(
            vec![
                vec![proc_info(1), proc_info(2)],
                vec![proc_info(2), proc_info(3)],
                vec![proc_info(2), proc_info(3)],
            ],
            vec![vec![], vec![], vec![]],
        );
        let (mut watcher, rx) = watcher_with(lister);

        watcher.poll();
        watcher.poll();
        watcher.poll();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ScanEvent::VmsAdded(p) if pids(p) == vec![1, 2]));
        assert!(matches!(&events[1], ScanEvent::VmsGone(p) if pids(p) == vec![1]));
        assert!(matches!(&events[2], ScanEvent::VmsAdded(p) if pids(p) == vec![3]));
    }

    #[test]
    fn daemon_events_only_on_zero_transitions() {
        let lister = ScriptedLister::new(
            vec![vec![]; 5],
            vec![
                vec![proc_info(10)],
                vec![proc_info(10), proc_info(11)], // more instances: no event
                vec![proc_info(11)],               // still running: no event
                vec![],                            // last instance gone
                vec![],
            ],
        );
        let (mut watcher, rx) = watcher_with(lister);

        for _ in 0..5 {
            watcher.poll();
        }

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ScanEvent::DaemonAppeared));
        assert!(matches!(events[1], ScanEvent::DaemonGone));
    }

    #[test]
    fn run_drains_until_collections_empty() {
        let lister = ScriptedLister::new(
            vec![vec![proc_info(1)]], // then empty forever
            vec![vec![]],
        );
        let (mut watcher, rx) = watcher_with(lister);

        watcher.poll();
        assert!(!watcher.vm_procs.is_empty());

        // cancellation alone must not stop the loop while pid 1 is tracked
        watcher.token.cancel();
        watcher.run();
        assert!(watcher.vm_procs.is_empty());

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, ScanEvent::VmsGone(p) if pids(p) == vec![1])));
    }

    #[test]
    fn proc_lister_handles_self() {
        // our own comm is this test binary's name; just exercise the path
        let lister = ProcLister;
        let procs = lister.list_by_name("definitely-not-a-real-process");
        assert!(procs.is_empty());
    }

    #[test]
    fn log_path_event_carries_path() {
        let event = ScanEvent::LogPathFound(PathBuf::from("/vms/a/Logs"));
        assert!(matches!(event, ScanEvent::LogPathFound(p) if p.ends_with("Logs")));
    }
}
