// src/server/process.rs
use crate::config::BackingConfig;
use crate::error::{Error, Result};
use async_process::{Child, Command, Stdio};
use async_trait::async_trait;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use futures_lite::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for one launch of the backing process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to run: command, arguments and environment overrides.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Layered over the inherited environment.
    pub env: HashMap<String, String>,
    pub shutdown_grace: Duration,
}

impl From<&BackingConfig> for LaunchSpec {
    fn from(config: &BackingConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.child_env(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// A running backing process as seen by the manager.
#[async_trait]
pub trait ChildHandle: Send {
    fn id(&self) -> ProcessId;

    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit, returning its exit code if it had one.
    ///
    /// Must be safe to drop and call again.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Stop the process and reap it.
    async fn terminate(&mut self) -> Result<Option<i32>>;
}

/// Produces a fresh [`ChildHandle`] for every (re)start.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ChildHandle>>;
}

/// Launches real OS processes from a [`LaunchSpec`].
pub struct CommandLauncher {
    spec: LaunchSpec,
}

impl CommandLauncher {
    pub fn new(spec: LaunchSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    async fn launch(&self) -> Result<Box<dyn ChildHandle>> {
        let process = BackingProcess::spawn(&self.spec)?;
        Ok(Box::new(process))
    }
}

/// The OS-level backing process
pub struct BackingProcess {
    id: ProcessId,
    pid: u32,
    child: Child,
    shutdown_grace: Duration,
}

impl BackingProcess {
    /// Spawn the process and start relaying its output into the log.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let mut command = Command::new(&spec.command);
        command.args(&spec.args);
        command.envs(&spec.env);

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Process(format!("Failed to start process: {}", e)))?;

        let id = ProcessId::new();
        let pid = child.id();

        tracing::info!(
            launch_id = %id,
            pid,
            command = %spec.command,
            args = ?spec.args,
            env_overrides = ?spec.env.keys().collect::<Vec<_>>(),
            "Backing process started"
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_output(stdout, pid, OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_output(stderr, pid, OutputStream::Stderr));
        }

        Ok(Self {
            id,
            pid,
            child,
            shutdown_grace: spec.shutdown_grace,
        })
    }

    #[cfg(unix)]
    fn send_sigterm(&self) -> Result<bool> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            Ok(()) => Ok(true),
            // Already gone; only reaping is left.
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(Error::Process(format!("Failed to send SIGTERM: {}", e))),
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&self) -> Result<bool> {
        Ok(false)
    }
}

#[async_trait]
impl ChildHandle for BackingProcess {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .status()
            .await
            .map_err(|e| Error::Process(format!("Failed to wait for process: {}", e)))?;
        Ok(status.code())
    }

    async fn terminate(&mut self) -> Result<Option<i32>> {
        if self.send_sigterm()? {
            if let Ok(code) = tokio::time::timeout(self.shutdown_grace, self.wait()).await {
                return code;
            }
            tracing::warn!(
                pid = self.pid,
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "Backing process ignored SIGTERM, killing"
            );
        }

        if let Err(e) = self.child.kill() {
            // The process may have exited between the signal and the kill.
            tracing::debug!(pid = self.pid, error = %e, "Kill failed");
        }
        self.wait().await
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Forward child output into the log line by line until EOF.
async fn relay_output<R>(reader: R, pid: u32, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => match stream {
                OutputStream::Stdout => {
                    tracing::info!(target: "backing", pid, stream = "stdout", "{}", line)
                }
                OutputStream::Stderr => {
                    tracing::warn!(target: "backing", pid, stream = "stderr", "{}", line)
                }
            },
            Err(e) => {
                tracing::warn!(target: "backing", pid, stream = ?stream, error = %e, "Output relay stopped");
                break;
            }
        }
    }
}
