//! Process supervisor
//!
//! Owns at most one generation of the user's command. Every generation runs
//! in its own process group so the shell and everything it starts can be
//! signalled together. A new generation is only spawned once the previous
//! one has been terminated and fully reaped.

use std::os::unix::process::CommandExt;
use std::process::Command;
use std::thread::sleep;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use sqwatch_core::{WatchError, WatchResult};
use tracing::{debug, warn};

/// How the leader of the current generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(Signal),
}

#[derive(Debug, Clone, Copy)]
struct Generation {
    pgid: Pid,
    /// The leader has been reaped; other group members may remain
    leader_reaped: bool,
}

#[derive(Debug)]
pub struct Supervisor {
    grace: Duration,
    current: Option<Generation>,
}

impl Supervisor {
    /// `grace` is the wait between SIGTERM and SIGKILL
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            current: None,
        }
    }

    /// Process group of the live generation
    pub fn current(&self) -> Option<Pid> {
        self.current.map(|generation| generation.pgid)
    }

    /// Retire the live generation, then start `command` if there is one
    ///
    /// Returns without waiting for the new generation.
    pub fn supervise(&mut self, command: Option<&str>) -> WatchResult<Option<Pid>> {
        self.retire();

        let Some(command) = command else {
            return Ok(None);
        };

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .process_group(0)
            .spawn()
            .map_err(|source| WatchError::Spawn {
                command: command.to_owned(),
                source,
            })?;

        let pgid = Pid::from_raw(child.id() as i32);
        debug!("Started `{}` as process group {}", command, pgid);
        self.current = Some(Generation {
            pgid,
            leader_reaped: false,
        });
        Ok(Some(pgid))
    }

    /// Terminate and reap the live generation
    ///
    /// SIGTERM goes to the whole group; whatever is still alive after the
    /// grace period gets SIGKILL. Blocks until no child in the group is left.
    pub fn retire(&mut self) {
        let Some(generation) = self.current.take() else {
            return;
        };
        let pgid = generation.pgid;

        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) => {
                sleep(self.grace);
                reap_exited(pgid);
                if killpg(pgid, None).is_ok() {
                    debug!("Process group {} outlived SIGTERM, sending SIGKILL", pgid);
                    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                        debug!("SIGKILL to process group {}: {}", pgid, e);
                    }
                }
            }
            Err(Errno::ESRCH) => debug!("Process group {} already gone", pgid),
            Err(e) => warn!("Failed to signal process group {}: {}", pgid, e),
        }

        reap_group(pgid);
    }

    /// Check, without blocking, whether the live generation has ended
    ///
    /// Reports the leader's exit once. The generation is only dropped when
    /// nothing in its group is left.
    pub fn poll(&mut self) -> Option<ChildExit> {
        let generation = self.current.as_mut()?;
        let mut exit = None;

        if !generation.leader_reaped {
            match waitpid(generation.pgid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => exit = Some(ChildExit::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    exit = Some(ChildExit::Signaled(signal));
                }
                Ok(_) => return None,
                Err(Errno::ECHILD) => {}
                Err(e) => {
                    debug!("waitpid({}): {}", generation.pgid, e);
                    return None;
                }
            }
            generation.leader_reaped = true;
        }

        if killpg(generation.pgid, None) == Err(Errno::ESRCH) {
            self.current = None;
        }
        exit
    }
}

/// Reap members of `pgid` that have already exited
fn reap_exited(pgid: Pid) {
    let group = Pid::from_raw(-pgid.as_raw());
    loop {
        match waitpid(group, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => debug!("Reaped {:?}", status),
        }
    }
}

/// Block until no child in `pgid` is left
fn reap_group(pgid: Pid) {
    let group = Pid::from_raw(-pgid.as_raw());
    loop {
        match waitpid(group, None) {
            Ok(status) => debug!("Reaped {:?}", status),
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}

/// Short description of a fatal signal
pub fn describe_signal(signal: Signal) -> &'static str {
    match signal {
        Signal::SIGFPE => "Floating point exception",
        Signal::SIGILL => "Illegal instruction",
        Signal::SIGSEGV => "Segmentation fault",
        Signal::SIGBUS => "Bus error",
        Signal::SIGABRT => "Aborted",
        Signal::SIGTERM => "Terminated",
        Signal::SIGINT => "Interrupted",
        _ => "Unknown signal",
    }
}

/// `Command terminated by signal 11 (SIGSEGV: Segmentation fault)`
pub fn signal_report(signal: Signal) -> String {
    format!(
        "Command terminated by signal {} ({}: {})",
        signal as i32,
        signal.as_str(),
        describe_signal(signal)
    )
}
