//! Helpers for driving the `sqwatch` binary
//!
//! `SqwatchCommand` runs the binary either to completion (argument errors,
//! help output) or in the background so a test can touch watched files and
//! then stop it with a signal.

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// CLI command builder with timing
pub struct SqwatchCommand {
    binary_path: PathBuf,
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl SqwatchCommand {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_sqwatch")),
            working_dir: working_dir.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn arg_path(&mut self, flag: &str, path: &Path) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.push(path.display().to_string());
        self
    }

    pub fn env(&mut self, key: &str, value: impl AsRef<Path>) -> &mut Self {
        self.env
            .insert(key.to_string(), value.as_ref().display().to_string());
        self
    }

    /// Upper bound on how long a run may take before it is killed
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Start in the background
    pub fn spawn(&self) -> Result<RunningWatch> {
        let child = self.command().spawn().context("Failed to spawn sqwatch")?;
        Ok(RunningWatch {
            child,
            started: Instant::now(),
            timeout: self.timeout,
        })
    }

    /// Run to completion
    pub fn execute(&self) -> Result<CommandResult> {
        self.spawn()?.wait()
    }

    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }
        Ok(result)
    }

    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }
        Ok(result)
    }
}

/// A `sqwatch` process running in the background
pub struct RunningWatch {
    child: Child,
    started: Instant,
    timeout: Duration,
}

impl RunningWatch {
    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    pub fn signal(&self, signal: Signal) -> Result<()> {
        kill(self.pid(), signal).context("Failed to signal sqwatch")
    }

    /// Send SIGTERM and collect the output
    pub fn terminate(self) -> Result<CommandResult> {
        self.signal(Signal::SIGTERM)?;
        self.wait()
    }

    /// Wait for exit, killing the process once the timeout has passed
    pub fn wait(mut self) -> Result<CommandResult> {
        let deadline = self.started + self.timeout;
        while self.child.try_wait()?.is_none() {
            if Instant::now() >= deadline {
                self.child.kill()?;
                break;
            }
            sleep(Duration::from_millis(20));
        }

        let output = self
            .child
            .wait_with_output()
            .context("Failed to wait for sqwatch")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: self.started.elapsed(),
        })
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}

/// Poll `condition` every 20ms until it holds or `limit` passes
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20));
    }
    condition()
}
