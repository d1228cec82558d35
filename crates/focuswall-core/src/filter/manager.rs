//! Lifecycle of the external filtering process.
//!
//! [`FilterProcessManager`] owns at most one filtering process and the
//! system proxy registration that routes traffic through it. Signals are
//! delivered on the calling thread (they never block); waiting on the old
//! process and every OS proxy command run on a single background worker fed
//! by a queue, so they complete in the order they were requested.

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::command::FilterCommand;
use super::process::{reap, signal_stop, FilterChild, ProcessLauncher, StopSignal, TerminationPolicy};
use super::proxy::SystemProxy;
use super::rules::{write_rule_script, FilterRuleSet};
use crate::error::FilterError;

/// Everything needed to start filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRequest {
    pub port: u16,
    pub rules: FilterRuleSet,
    pub binary: PathBuf,
}

/// Recoverable problems found by background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNotice {
    ProxyRegistrationFailed { port: u16, message: String },
    ProxyDeregistrationFailed { message: String },
}

impl std::fmt::Display for FilterNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterNotice::ProxyRegistrationFailed { port, message } => write!(
                f,
                "Website filter is not active: registering the system proxy on port {port} failed ({message})"
            ),
            FilterNotice::ProxyDeregistrationFailed { message } => write!(
                f,
                "Removing the system proxy failed; check your network proxy settings ({message})"
            ),
        }
    }
}

/// The filtering operations the session coordinator relies on.
pub trait FilterControl: Send {
    fn start_filtering(&mut self, request: &FilterRequest) -> Result<(), FilterError>;
    fn stop_filtering(&mut self, delete_proxy: bool);
    fn is_filtering(&self) -> bool;
    fn drain_notices(&mut self) -> Vec<FilterNotice>;
    /// Stop filtering and wait for pending background work.
    fn shutdown(&mut self);
}

enum Job {
    Register(u16),
    Deregister,
    Reap {
        child: Box<dyn FilterChild>,
        signal: StopSignal,
    },
}

pub struct FilterProcessManager {
    launcher: Box<dyn ProcessLauncher>,
    script_dir: PathBuf,
    policy: TerminationPolicy,
    active: Option<Box<dyn FilterChild>>,
    proxy_port: Option<u16>,
    jobs: Option<UnboundedSender<Job>>,
    notices: UnboundedReceiver<FilterNotice>,
    worker: Option<JoinHandle<()>>,
}

impl FilterProcessManager {
    /// Create a manager and start its background worker.
    ///
    /// `grace` bounds how long an interrupted process may take to exit
    /// before it is killed.
    pub fn new(
        launcher: Box<dyn ProcessLauncher>,
        proxy: Box<dyn SystemProxy>,
        script_dir: PathBuf,
        grace: Duration,
    ) -> Result<Self, FilterError> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("focuswall-filter".into())
            .spawn(move || run_worker(proxy, job_rx, notice_tx, grace))
            .map_err(|source| FilterError::Spawn {
                binary: "focuswall-filter worker".into(),
                source,
            })?;
        Ok(Self {
            launcher,
            script_dir,
            policy: TerminationPolicy::native(),
            active: None,
            proxy_port: None,
            jobs: Some(job_tx),
            notices: notice_rx,
            worker: Some(worker),
        })
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start a filtering process for `request`, replacing any running one.
    ///
    /// Returns once the process is spawned; it may not be filtering yet.
    /// Proxy registration happens in the background and reports failures
    /// through [`drain_notices`](Self::drain_notices).
    pub fn start_filtering(&mut self, request: &FilterRequest) -> Result<(), FilterError> {
        self.stop_filtering(false);
        if self.jobs.is_none() {
            return Err(FilterError::WorkerGone);
        }

        let script = write_rule_script(&self.script_dir)?;
        let command = FilterCommand {
            binary: request.binary.clone(),
            port: request.port,
            script,
            addresses_str: request.rules.addresses_str(),
            mode: request.rules.mode,
        };
        let child = self
            .launcher
            .launch(&command)
            .map_err(|source| FilterError::Spawn {
                binary: request.binary.display().to_string(),
                source,
            })?;
        info!(
            pid = child.pid(),
            port = request.port,
            mode = %request.rules.mode,
            addresses = request.rules.addresses.len(),
            "filtering started"
        );
        self.active = Some(child);
        self.proxy_port = Some(request.port);
        self.submit(Job::Register(request.port));
        Ok(())
    }

    /// Stop the running filtering process, if any, and optionally remove
    /// the system proxy registration.
    pub fn stop_filtering(&mut self, delete_proxy: bool) {
        match self.active.take() {
            Some(mut child) => {
                let signal = signal_stop(child.as_mut(), self.policy);
                debug!(pid = child.pid(), ?signal, "filter process signalled");
                self.submit(Job::Reap { child, signal });
            }
            None => debug!("no filtering process to stop"),
        }
        if delete_proxy {
            self.proxy_port = None;
            self.submit(Job::Deregister);
        }
    }

    pub fn is_filtering(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.active.as_ref().map(|c| c.pid())
    }

    /// Port of the requested proxy registration, if one is in place.
    pub fn proxy_port(&self) -> Option<u16> {
        self.proxy_port
    }

    pub fn drain_notices(&mut self) -> Vec<FilterNotice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }

    /// Stop filtering, remove a proxy this manager registered and wait for
    /// the worker to finish.
    pub fn shutdown(&mut self) {
        if self.worker.is_none() {
            return;
        }
        self.stop_filtering(self.proxy_port.is_some());
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("filter worker panicked during shutdown");
            }
        }
        info!("filter manager shut down");
    }

    fn submit(&self, job: Job) {
        let Some(jobs) = &self.jobs else {
            warn!("filter worker is gone; dropping job");
            return;
        };
        if jobs.send(job).is_err() {
            warn!("filter worker stopped unexpectedly; dropping job");
        }
    }
}

impl FilterControl for FilterProcessManager {
    fn start_filtering(&mut self, request: &FilterRequest) -> Result<(), FilterError> {
        FilterProcessManager::start_filtering(self, request)
    }

    fn stop_filtering(&mut self, delete_proxy: bool) {
        FilterProcessManager::stop_filtering(self, delete_proxy)
    }

    fn is_filtering(&self) -> bool {
        FilterProcessManager::is_filtering(self)
    }

    fn drain_notices(&mut self) -> Vec<FilterNotice> {
        FilterProcessManager::drain_notices(self)
    }

    fn shutdown(&mut self) {
        FilterProcessManager::shutdown(self)
    }
}

impl Drop for FilterProcessManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    proxy: Box<dyn SystemProxy>,
    mut jobs: UnboundedReceiver<Job>,
    notices: UnboundedSender<FilterNotice>,
    grace: Duration,
) {
    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Register(port) => match proxy.register(port) {
                Ok(()) => info!(port, "system proxy registered"),
                Err(e) => {
                    warn!(port, error = %e, "system proxy registration failed");
                    let _ = notices.send(FilterNotice::ProxyRegistrationFailed {
                        port,
                        message: e.to_string(),
                    });
                }
            },
            Job::Deregister => match proxy.deregister() {
                Ok(()) => info!("system proxy deregistered"),
                Err(e) => {
                    warn!(error = %e, "system proxy deregistration failed");
                    let _ = notices.send(FilterNotice::ProxyDeregistrationFailed {
                        message: e.to_string(),
                    });
                }
            },
            Job::Reap { child, signal } => reap(child, signal, grace),
        }
    }
    debug!("filter worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rules::FilterMode;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct World {
        next_pid: u32,
        alive: Vec<u32>,
        launched: Vec<Vec<String>>,
        interrupts: usize,
        kills: usize,
        deny_interrupt: bool,
        proxy_calls: Vec<String>,
        fail_register: bool,
    }

    type Shared = Arc<Mutex<World>>;

    struct FakeLauncher(Shared);

    struct FakeChild {
        pid: u32,
        world: Shared,
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, command: &FilterCommand) -> io::Result<Box<dyn FilterChild>> {
            let mut w = self.0.lock().unwrap();
            w.next_pid += 1;
            let pid = w.next_pid;
            w.alive.push(pid);
            w.launched.push(command.args());
            Ok(Box::new(FakeChild {
                pid,
                world: self.0.clone(),
            }))
        }
    }

    impl FakeChild {
        fn exit(&self, w: &mut World) -> io::Result<()> {
            let before = w.alive.len();
            w.alive.retain(|p| *p != self.pid);
            if w.alive.len() == before {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such process"))
            } else {
                Ok(())
            }
        }
    }

    impl FilterChild for FakeChild {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn interrupt(&mut self) -> io::Result<()> {
            let mut w = self.world.lock().unwrap();
            w.interrupts += 1;
            if w.deny_interrupt {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            self.exit(&mut w)
        }

        fn kill(&mut self) -> io::Result<()> {
            let mut w = self.world.lock().unwrap();
            w.kills += 1;
            self.exit(&mut w)
        }

        fn wait_timeout(&mut self, _timeout: Duration) -> io::Result<bool> {
            Ok(!self.world.lock().unwrap().alive.contains(&self.pid))
        }
    }

    struct FakeProxy(Shared);

    impl SystemProxy for FakeProxy {
        fn register(&self, port: u16) -> Result<(), FilterError> {
            let mut w = self.0.lock().unwrap();
            w.proxy_calls.push(format!("register:{port}"));
            if w.fail_register {
                return Err(FilterError::ProxyUnsupported);
            }
            Ok(())
        }

        fn deregister(&self) -> Result<(), FilterError> {
            self.0.lock().unwrap().proxy_calls.push("deregister".into());
            Ok(())
        }
    }

    struct FailingLauncher;

    impl ProcessLauncher for FailingLauncher {
        fn launch(&self, _command: &FilterCommand) -> io::Result<Box<dyn FilterChild>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "mitmdump not found"))
        }
    }

    fn manager(world: &Shared, dir: &tempfile::TempDir) -> FilterProcessManager {
        FilterProcessManager::new(
            Box::new(FakeLauncher(world.clone())),
            Box::new(FakeProxy(world.clone())),
            dir.path().to_path_buf(),
            Duration::from_millis(10),
        )
        .unwrap()
        .with_policy(TerminationPolicy::Interrupt)
    }

    fn request(addresses: &[&str]) -> FilterRequest {
        FilterRequest {
            port: 8080,
            rules: FilterRuleSet::new(FilterMode::Blocklist, addresses.iter().copied()),
            binary: PathBuf::from("mitmdump"),
        }
    }

    #[test]
    fn restart_keeps_at_most_one_process_alive() {
        let world = Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir);

        mgr.start_filtering(&request(&["a.com"])).unwrap();
        mgr.start_filtering(&request(&["b.org"])).unwrap();
        mgr.start_filtering(&request(&["c.net"])).unwrap();

        {
            let w = world.lock().unwrap();
            assert_eq!(w.alive.len(), 1);
            assert_eq!(Some(w.alive[0]), mgr.active_pid());
            assert!(w.launched[2].contains(&"addresses_str=c.net".to_string()));
        }
        assert!(mgr.is_filtering());
        assert!(dir.path().join(crate::filter::RULE_SCRIPT_FILE).exists());
    }

    #[test]
    fn proxy_jobs_complete_in_submission_order() {
        let world = Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir);

        mgr.start_filtering(&request(&["a.com"])).unwrap();
        mgr.stop_filtering(true);
        mgr.start_filtering(&request(&["a.com"])).unwrap();
        mgr.shutdown();

        let w = world.lock().unwrap();
        assert_eq!(
            w.proxy_calls,
            vec!["register:8080", "deregister", "register:8080", "deregister"]
        );
        assert!(w.alive.is_empty());
        assert!(!mgr.is_filtering());
    }

    #[test]
    fn stop_without_process_is_harmless() {
        let world = Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir);
        mgr.stop_filtering(false);
        mgr.stop_filtering(true);
        mgr.shutdown();
        let w = world.lock().unwrap();
        assert_eq!(w.interrupts, 0);
        assert_eq!(w.proxy_calls, vec!["deregister"]);
    }

    #[test]
    fn spawn_failure_propagates_and_registers_nothing() {
        let world = Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = FilterProcessManager::new(
            Box::new(FailingLauncher),
            Box::new(FakeProxy(world.clone())),
            dir.path().to_path_buf(),
            Duration::from_millis(10),
        )
        .unwrap();

        let err = mgr.start_filtering(&request(&["a.com"])).unwrap_err();
        assert!(matches!(err, FilterError::Spawn { .. }));
        assert!(!mgr.is_filtering());
        drop(mgr);
        assert!(world.lock().unwrap().proxy_calls.is_empty());
    }

    #[test]
    fn registration_failure_is_reported_as_notice() {
        let world = Shared::default();
        world.lock().unwrap().fail_register = true;
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir);

        mgr.start_filtering(&request(&["a.com"])).unwrap();
        mgr.shutdown();

        let notices = mgr.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(
            notices[0],
            FilterNotice::ProxyRegistrationFailed { port: 8080, .. }
        ));
    }

    #[test]
    fn denied_interrupt_falls_back_to_kill() {
        let world = Shared::default();
        world.lock().unwrap().deny_interrupt = true;
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir);

        mgr.start_filtering(&request(&["a.com"])).unwrap();
        mgr.stop_filtering(false);

        let w = world.lock().unwrap();
        assert_eq!(w.interrupts, 1);
        assert_eq!(w.kills, 1);
        assert!(w.alive.is_empty());
    }

    #[test]
    fn force_kill_policy_skips_interrupt() {
        let world = Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir).with_policy(TerminationPolicy::ForceKill);

        mgr.start_filtering(&request(&["a.com"])).unwrap();
        mgr.stop_filtering(false);

        let w = world.lock().unwrap();
        assert_eq!(w.interrupts, 0);
        assert_eq!(w.kills, 1);
    }

    #[test]
    fn start_after_shutdown_fails() {
        let world = Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(&world, &dir);
        mgr.shutdown();
        assert!(matches!(
            mgr.start_filtering(&request(&["a.com"])),
            Err(FilterError::WorkerGone)
        ));
    }
}
