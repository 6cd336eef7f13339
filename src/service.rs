use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::Pid;

use crate::cleaner::{paths, DropCleaner, RootLogCleaner, VmLogCleaner};
use crate::config::Config;
use crate::io::lock::FlockProbe;
use crate::scanner::processes::{ProcLister, ProcessLister};
use crate::scanner::{DriveWalker, ProcessWatcher, ScanEvent};
use crate::util::delay::{sleep_through, ShutdownToken};
use crate::error::Result;

static SHUTDOWN: OnceLock<ShutdownToken> = OnceLock::new();

/// Install signal handlers for graceful shutdown
pub fn install_signal_handlers(token: ShutdownToken) -> Result<()> {
    let _ = SHUTDOWN.set(token);

    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_shutdown))
            .map_err(crate::error::SweepError::Signal)?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(handle_shutdown))
            .map_err(crate::error::SweepError::Signal)?;
    }

    Ok(())
}

extern "C" fn handle_shutdown(_: i32) {
    if let Some(token) = SHUTDOWN.get() {
        token.cancel();
    }
}

/// Owns the watchers and cleaners and runs the service lifecycle: wire
/// everything at startup, pump scan events to the cleaners, and on
/// cancellation run the ordered shutdown drain.
pub struct Service {
    config: Config,
    token: ShutdownToken,
    drop_cleaner: DropCleaner,
    vm_cleaner: VmLogCleaner,
    root_cleaner: RootLogCleaner,
}

impl Service {
    pub fn new(config: Config) -> Self {
        let token = ShutdownToken::new();

        let drop_cleaner = DropCleaner::new(
            config.drop.clone(),
            config.paths.clone(),
            Arc::new(FlockProbe),
            token.clone(),
        );
        let vm_cleaner = VmLogCleaner::new(config.vm_logs.clone(), token.clone());
        let root_cleaner = RootLogCleaner::new(
            config.root_logs.clone(),
            config.paths.clone(),
            token.clone(),
        );

        Self {
            config,
            token,
            drop_cleaner,
            vm_cleaner,
            root_cleaner,
        }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// Run until a shutdown signal arrives, then drain.
    pub fn run(&self) -> Result<()> {
        tracing::info!("vbox-sweeper starting");
        log_user_accounts(&self.config);

        install_signal_handlers(self.token.clone())?;

        // startup triggers
        self.root_cleaner.startup_clean();
        self.drop_cleaner.clean();

        let (events_tx, events_rx) = mpsc::channel::<ScanEvent>();

        let pump = {
            let vm_cleaner = self.vm_cleaner.clone();
            let root_cleaner = self.root_cleaner.clone();
            let drop_cleaner = self.drop_cleaner.clone();
            thread::spawn(move || {
                // ends when the last sender is dropped
                for event in events_rx {
                    dispatch_event(event, &vm_cleaner, &root_cleaner, &drop_cleaner);
                }
                tracing::debug!("Event pump stopped");
            })
        };

        let watcher_handle = {
            let mut watcher = ProcessWatcher::new(
                &self.config.watcher,
                Arc::new(ProcLister),
                events_tx.clone(),
                self.token.clone(),
            );
            thread::spawn(move || watcher.run())
        };

        let walker_handle = {
            let walker = DriveWalker::new(
                self.config.walker.clone(),
                events_tx,
                self.token.clone(),
            );
            thread::spawn(move || walker.run())
        };

        tracing::info!("vbox-sweeper running");
        while !self.token.is_cancelled() {
            sleep_through(Duration::from_millis(200));
        }

        tracing::info!("Shutdown requested");
        self.shutdown();

        let _ = walker_handle.join();
        let _ = watcher_handle.join();
        let _ = pump.join();

        tracing::info!("vbox-sweeper stopped");
        Ok(())
    }

    /// The ordered shutdown sequence: every component already sees the
    /// cancelled token; drain them one by one, and only then fall back to
    /// killing the product's helper processes.
    fn shutdown(&self) {
        self.drop_cleaner.shutdown();
        self.vm_cleaner.wait_termination();
        self.root_cleaner.wait_termination();

        for name in &self.config.paths.helper_processes {
            kill_processes_by_name(name);
        }
    }

    /// One-shot cleanup pass: root logs and drop folders, no watchers.
    /// Runs in drain mode so the drop grace period is skipped.
    pub fn sweep(&self, include_root_logs: bool) -> Result<()> {
        tracing::info!("One-shot sweep");
        log_user_accounts(&self.config);

        self.token.cancel();
        if include_root_logs {
            self.root_cleaner.startup_clean();
        }
        self.drop_cleaner.shutdown();

        tracing::info!("Sweep finished");
        Ok(())
    }
}

/// Route one scan event to the cleaner that owns the reaction.
fn dispatch_event(
    event: ScanEvent,
    vm_cleaner: &VmLogCleaner,
    root_cleaner: &RootLogCleaner,
    drop_cleaner: &DropCleaner,
) {
    match event {
        ScanEvent::VmsAdded(procs) => vm_cleaner.on_vms_added(&procs),
        ScanEvent::VmsGone(procs) => {
            if vm_cleaner.on_vms_gone(&procs) {
                // no tracked VMs remain: sweep the drop folders
                drop_cleaner.clean();
            }
        }
        ScanEvent::DaemonAppeared => root_cleaner.on_daemon_appeared(),
        ScanEvent::DaemonGone => root_cleaner.on_daemon_gone(),
        ScanEvent::LogPathFound(path) => vm_cleaner.on_log_path_found(&path),
    }
}

/// Last-resort termination of the product's helper processes.
fn kill_processes_by_name(name: &str) {
    for proc in ProcLister.list_by_name(name) {
        match signal::kill(Pid::from_raw(proc.pid), Signal::SIGKILL) {
            Ok(()) => tracing::info!("Killed leftover '{}' (pid {})", name, proc.pid),
            Err(e) => tracing::warn!("Failed to kill '{}' (pid {}): {}", name, proc.pid, e),
        }
    }
}

fn log_user_accounts(config: &Config) {
    for home in paths::user_homes(&config.paths) {
        if let Some(name) = home.file_name() {
            tracing::info!("User: {}", name.to_string_lossy());
        }
    }
}
