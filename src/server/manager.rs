//! Child process manager: launch, watch, and relaunch the backing process.

use crate::error::{Error, Result};
use crate::server::lifecycle::{LifecycleEvent, UnitLifecycle};
use crate::server::process::{ChildHandle, Launcher};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Restart policy: a constant delay between exit and the next launch.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

/// Point-in-time view of the backing process.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSnapshot {
    pub launch_id: Option<String>,
    pub pid: Option<u32>,
    pub running: bool,
    /// Successful launches so far.
    pub launches: u64,
    pub restarts: u64,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    /// When the current process was launched.
    #[serde(skip)]
    pub started_at: Option<Instant>,
}

/// Shared child state. Written only by [`ChildProcessManager`].
#[derive(Debug, Default)]
pub struct ChildState {
    inner: Mutex<ChildSnapshot>,
}

impl ChildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ChildSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update<F: FnOnce(&mut ChildSnapshot)>(&self, f: F) {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn record_started(&self, child: &dyn ChildHandle) {
        self.record_launch(child.id().to_string(), child.pid());
    }

    pub(crate) fn record_launch(&self, launch_id: String, pid: Option<u32>) {
        self.update(|s| {
            s.launch_id = Some(launch_id);
            s.pid = pid;
            s.running = true;
            s.restarts = s.launches;
            s.launches += 1;
            s.last_error = None;
            s.started_at = Some(Instant::now());
        });
    }

    pub(crate) fn record_exit(&self, code: Option<i32>, error: Option<String>) {
        self.update(|s| {
            s.running = false;
            s.pid = None;
            s.last_exit_code = code;
            s.last_error = error;
        });
    }

    fn record_launch_failure(&self, error: &Error) {
        self.update(|s| {
            s.running = false;
            s.last_error = Some(error.to_string());
        });
    }
}

/// Why the manager loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerExit {
    /// Shutdown was requested and the child has been stopped.
    Stopped,
}

/// Owns the single backing process and keeps it running.
///
/// A child exit is never fatal here: the manager waits out the restart
/// delay and launches again, indefinitely. Only a shutdown request (from a
/// signal or from health escalation) ends the loop.
pub struct ChildProcessManager<L: Launcher> {
    launcher: L,
    policy: RestartPolicy,
    state: Arc<ChildState>,
    lifecycle: Arc<UnitLifecycle>,
}

impl<L: Launcher> ChildProcessManager<L> {
    pub fn new(
        launcher: L,
        policy: RestartPolicy,
        state: Arc<ChildState>,
        lifecycle: Arc<UnitLifecycle>,
    ) -> Self {
        Self {
            launcher,
            policy,
            state,
            lifecycle,
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    #[tracing::instrument(skip_all, fields(restart_delay_ms = self.policy.delay.as_millis() as u64))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ManagerExit {
        loop {
            if *shutdown.borrow() {
                return ManagerExit::Stopped;
            }

            let mut child = match self.launcher.launch().await {
                Ok(child) => child,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to launch backing process");
                    self.state.record_launch_failure(&e);
                    self.lifecycle
                        .record(LifecycleEvent::LaunchFailed, Some(e.to_string()));
                    if !self.backoff(&mut shutdown).await {
                        return ManagerExit::Stopped;
                    }
                    continue;
                }
            };

            self.state.record_started(child.as_ref());
            self.lifecycle.record(
                LifecycleEvent::ChildStarted,
                child.pid().map(|pid| format!("pid {}", pid)),
            );

            // Only one child exists at a time: the next launch happens after
            // this one has been reaped.
            tokio::select! {
                exit = child.wait() => {
                    let (code, error) = match exit {
                        Ok(code) => (code, None),
                        Err(e) => (None, Some(e.to_string())),
                    };
                    tracing::warn!(
                        launch_id = %child.id(),
                        exit_code = ?code,
                        error = ?error,
                        "Backing process exited"
                    );
                    self.state.record_exit(code, error);
                    self.lifecycle.record(
                        LifecycleEvent::ChildExited,
                        Some(format!("exit code {:?}", code)),
                    );
                }
                _ = shutdown_requested(&mut shutdown) => {
                    self.stop_child(child.as_mut()).await;
                    return ManagerExit::Stopped;
                }
            }

            if !self.backoff(&mut shutdown).await {
                return ManagerExit::Stopped;
            }
            tracing::info!("Restarting backing process");
        }
    }

    async fn stop_child(&self, child: &mut dyn ChildHandle) {
        tracing::info!(launch_id = %child.id(), pid = ?child.pid(), "Stopping backing process");
        let result = child.terminate().await;
        match &result {
            Ok(code) => tracing::info!(exit_code = ?code, "Backing process stopped"),
            Err(e) => tracing::error!(error = %e, "Failed to stop backing process"),
        }
        let (code, error) = match result {
            Ok(code) => (code, None),
            Err(e) => (None, Some(e.to_string())),
        };
        self.state.record_exit(code, error);
        self.lifecycle.record(LifecycleEvent::ChildStopped, None);
    }

    /// Sleep out the restart delay. Returns `false` if shutdown arrived first.
    async fn backoff(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.policy.delay) => true,
            _ = shutdown_requested(shutdown) => false,
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Convenience for callers that want a `Result` around a manager task.
pub async fn join_manager(handle: tokio::task::JoinHandle<ManagerExit>) -> Result<ManagerExit> {
    handle
        .await
        .map_err(|e| Error::Other(format!("Manager task failed: {}", e)))
}
