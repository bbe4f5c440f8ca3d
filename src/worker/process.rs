//! Worker process lifecycle.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{ExchangeError, ExchangeResult};

/// Default time a worker gets to exit after SIGTERM.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to launch a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable path.
    pub path: PathBuf,
    /// Arguments passed after the path.
    pub args: Vec<String>,
    /// Time between SIGTERM and SIGKILL during termination.
    pub shutdown_grace: Duration,
}

impl WorkerCommand {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// A running worker: its pipes and its liveness.
///
/// `is_alive` reports the last observed I/O state, not the OS process state.
/// Once a read or write on the pipes fails the handle is marked dead and
/// never becomes alive again.
pub struct WorkerHandle {
    command: PathBuf,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: Option<BufReader<ChildStdout>>,
    pid: Option<u32>,
    alive: bool,
    grace: Duration,
}

impl WorkerHandle {
    /// Spawn the worker with piped stdin and stdout.
    ///
    /// The worker's stderr is inherited so its diagnostics reach the host's
    /// log. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::SpawnFailed`] if the process cannot be
    /// created; no handle exists in that case.
    pub async fn spawn(command: &WorkerCommand) -> ExchangeResult<Self> {
        let spawn_failed = |source| ExchangeError::SpawnFailed {
            command: command.path.clone(),
            source,
        };

        let mut child = Command::new(&command.path)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_failed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed(std::io::Error::other("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed(std::io::Error::other("stdout not captured")))?;
        let pid = child.id();

        info!(
            worker = %command.path.display(),
            pid = pid.unwrap_or_default(),
            "spawned worker"
        );

        Ok(Self {
            command: command.path.clone(),
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            stdout: Some(BufReader::new(stdout)),
            pid,
            alive: true,
            grace: command.shutdown_grace,
        })
    }

    /// OS process id, if the process has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Record that the pipes can no longer be used.
    pub fn mark_dead(&mut self) {
        if self.alive {
            debug!(pid = self.pid.unwrap_or_default(), "worker marked dead");
        }
        self.alive = false;
    }

    pub(crate) fn writer(&mut self) -> ExchangeResult<&mut BufWriter<ChildStdin>> {
        match self.stdin.as_mut() {
            Some(stdin) if self.alive => Ok(stdin),
            _ => Err(ExchangeError::WorkerDead),
        }
    }

    pub(crate) fn reader(&mut self) -> ExchangeResult<&mut BufReader<ChildStdout>> {
        match self.stdout.as_mut() {
            Some(stdout) if self.alive => Ok(stdout),
            _ => Err(ExchangeError::WorkerDead),
        }
    }

    /// Stop the worker and reap it.
    ///
    /// Closes both pipes, sends SIGTERM, waits up to the shutdown grace for
    /// the process to exit, then sends SIGKILL and waits unconditionally.
    /// Safe to call any number of times; only the first call does anything.
    /// Returns the exit status if this call reaped the process.
    pub async fn terminate(&mut self) -> Option<ExitStatus> {
        self.alive = false;
        self.stdin = None;
        self.stdout = None;
        let mut child = self.child.take()?;
        let pid = self.pid.take().unwrap_or_default();

        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid, %status, "worker already exited");
            return Some(status);
        }

        send_sigterm(&child);
        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(pid, %status, "worker exited");
                    return Some(status);
                }
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    warn!(pid, error = %e, "failed to poll worker status");
                    break;
                }
            }
        }

        warn!(pid, grace = ?self.grace, "worker did not exit after SIGTERM, killing");
        if let Err(e) = child.start_kill() {
            warn!(pid, error = %e, "failed to kill worker");
        }
        match child.wait().await {
            Ok(status) => {
                info!(pid, %status, "worker killed");
                Some(status)
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to reap worker");
                None
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we have not reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                warn!(
                    pid = self.pid.unwrap_or_default(),
                    "worker handle dropped while running, killing"
                );
                child.start_kill().ok();
            }
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("alive", &self.alive)
            .finish()
    }
}
