//! Spawning and terminating the external filtering process.

use std::io;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use super::command::FilterCommand;

/// A running filtering process owned by the manager.
pub trait FilterChild: Send {
    fn pid(&self) -> u32;

    /// Ask the process to exit gracefully.
    ///
    /// Fails with `NotFound` when the process no longer exists and with
    /// `PermissionDenied` when the signal is not allowed.
    fn interrupt(&mut self) -> io::Result<()>;

    /// Force the process to exit. `NotFound` when it is already gone.
    fn kill(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for the process to exit. `Ok(true)` once it has.
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Starts filtering processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &FilterCommand) -> io::Result<Box<dyn FilterChild>>;
}

/// Launches the real binary through `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    fn launch(&self, command: &FilterCommand) -> io::Result<Box<dyn FilterChild>> {
        let child = Command::new(&command.binary)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!(pid = child.id(), command = %command.display_native(), "filter process spawned");
        Ok(Box::new(OsFilterProcess { child }))
    }
}

struct OsFilterProcess {
    child: Child,
}

impl FilterChild for OsFilterProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        let pid = Pid::from_u32(self.child.id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = system.process(pid) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such process"));
        };
        match process.kill_with(Signal::Interrupt) {
            Some(true) => Ok(()),
            Some(false) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "interrupt signal was refused",
            )),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "graceful interrupt is not available on this platform",
            )),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(io::Error::new(io::ErrorKind::NotFound, e))
            }
            other => other,
        }
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        Ok(self.child.wait_timeout(timeout)?.is_some())
    }
}

/// How a filtering process is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Interrupt first, force-kill only on access denied.
    Interrupt,
    /// Force-kill straight away.
    ForceKill,
}

impl TerminationPolicy {
    /// Windows has no interrupt signal the manager can deliver.
    pub fn native() -> Self {
        if cfg!(windows) {
            TerminationPolicy::ForceKill
        } else {
            TerminationPolicy::Interrupt
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopSignal {
    Interrupted,
    Killed,
    AlreadyGone,
}

/// Synchronous half of termination: deliver the stop signal without waiting.
pub(crate) fn signal_stop(child: &mut dyn FilterChild, policy: TerminationPolicy) -> StopSignal {
    let pid = child.pid();
    if policy == TerminationPolicy::Interrupt {
        match child.interrupt() {
            Ok(()) => return StopSignal::Interrupted,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(pid, "filter process already exited");
                return StopSignal::AlreadyGone;
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!(pid, "interrupt denied; force-killing filter process");
            }
            Err(e) => {
                warn!(pid, error = %e, "interrupt failed; force-killing filter process");
            }
        }
    }
    force_kill(child)
}

fn force_kill(child: &mut dyn FilterChild) -> StopSignal {
    let pid = child.pid();
    match child.kill() {
        Ok(()) => StopSignal::Killed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(pid, "filter process already exited");
            StopSignal::AlreadyGone
        }
        Err(e) => {
            warn!(pid, error = %e, "failed to kill filter process");
            StopSignal::AlreadyGone
        }
    }
}

/// Background half of termination: reap the process, escalating to a kill
/// when it outlives `grace`.
pub(crate) fn reap(mut child: Box<dyn FilterChild>, signal: StopSignal, grace: Duration) {
    let pid = child.pid();
    let exited = match child.wait_timeout(grace) {
        Ok(exited) => exited,
        Err(e) => {
            debug!(pid, error = %e, "wait on filter process failed");
            return;
        }
    };
    if exited {
        debug!(pid, ?signal, "filter process exited");
        return;
    }
    warn!(pid, grace_ms = grace.as_millis() as u64, "filter process ignored interrupt; killing");
    if force_kill(child.as_mut()) == StopSignal::Killed {
        let _ = child.wait_timeout(grace);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sleeper() -> OsFilterProcess {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        OsFilterProcess { child }
    }

    #[test]
    fn interrupt_stops_a_running_process() {
        let mut process = sleeper();
        process.interrupt().unwrap();
        assert!(process.wait_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn interrupt_after_exit_reports_not_found() {
        let mut process = sleeper();
        process.kill().unwrap();
        assert!(process.wait_timeout(Duration::from_secs(5)).unwrap());
        let err = process.interrupt().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn signal_stop_interrupts_under_native_policy() {
        let mut process = sleeper();
        let signal = signal_stop(&mut process, TerminationPolicy::Interrupt);
        assert_eq!(signal, StopSignal::Interrupted);
        reap(Box::new(process), signal, Duration::from_secs(5));
    }
}
