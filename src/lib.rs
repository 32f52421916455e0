/*!
 # Bridge Runner

 Supervise a single backing HTTP server process and front it with a
 streaming-safe reverse proxy.

 ## Overview

 Bridge Runner:
 - Binds a public HTTP listener immediately, independent of the backing process
 - Launches the backing process on a loopback port and relaunches it after a constant delay whenever it exits
 - Forwards ordinary requests, protocol upgrades and event streams to it, adding CORS and no-cache headers
 - Probes the backing process and terminates the whole unit after too many consecutive failures,
   leaving recovery to the outer orchestrator

 ## Basic Usage

 ```no_run
 use bridge_runner::{Bridge, Config, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Defaults, then BRIDGE_CONFIG, then the environment
     let config = Config::load()?;

     // Runs until SIGTERM/Ctrl-C or health escalation
     let exit = Bridge::new(config).run().await?;
     std::process::exit(exit.exit_code());
 }
 ```

 ## Public surface

 | Path | Behaviour |
 |---|---|
 | `/health` | always `200 ok` |
 | `/ping` | always `200 pong` |
 | `/_child/health`, `/_child/sse-check`, `/_bridge/status`, `/test-sse` | diagnostics |
 | `/sse` (`GET`) | event-stream tunnel |
 | anything else | reverse-proxied, including upgrades |
 | any path, `OPTIONS` | answered locally with CORS headers |
*/

pub mod config;
pub mod error;
pub mod proxy;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};

use crate::proxy::{ProxyServer, ProxyState};
use crate::server::manager::join_manager;
use crate::server::{
    ChildProcessManager, ChildState, CommandLauncher, HealthCheck, HealthMonitor, HealthState,
    HttpHealthCheck, LaunchSpec, Launcher, LifecycleEvent, MonitorExit, RestartPolicy,
    ServerHealth, ServerMonitorConfig, UnitLifecycle, UnitState,
};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// State shared by every component of the unit.
///
/// Each mutable piece has exactly one writer: `child` is written by the
/// [`ChildProcessManager`], `health` by the [`HealthMonitor`], and the
/// lifecycle flags by [`Bridge`]. Request handlers only read.
#[derive(Clone)]
pub struct SupervisorContext {
    pub config: Arc<Config>,
    pub child: Arc<ChildState>,
    pub health: Arc<HealthState>,
    pub lifecycle: Arc<UnitLifecycle>,
}

impl SupervisorContext {
    pub fn new(config: Config) -> Self {
        let threshold = config.health.failure_threshold;
        Self {
            config: Arc::new(config),
            child: Arc::new(ChildState::new()),
            health: Arc::new(HealthState::new(threshold)),
            lifecycle: Arc::new(UnitLifecycle::new()),
        }
    }

    /// Current unit state, derived from the listener flags, the child
    /// snapshot and the probe counter.
    ///
    /// Only successes since the current launch count; a relaunched child is
    /// starting again until a probe reaches it.
    pub fn state(&self) -> UnitState {
        if self.lifecycle.is_terminated() {
            return UnitState::Terminated;
        }
        if !self.lifecycle.is_listening() {
            return UnitState::Starting;
        }

        let child = self.child.snapshot();
        if child.launches == 0 {
            return UnitState::Listening;
        }

        let reached = child.running
            && child
                .started_at
                .is_some_and(|started| self.health.succeeded_since(started));
        if !reached {
            return UnitState::ChildStarting;
        }

        match self.health.health() {
            ServerHealth::Healthy => UnitState::Healthy,
            _ => UnitState::Degraded,
        }
    }
}

/// How the unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitExit {
    /// A termination signal was received.
    Signal,
    /// The health prober hit its failure threshold.
    Escalated { consecutive_failures: u32 },
}

impl UnitExit {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            UnitExit::Signal => 0,
            UnitExit::Escalated { .. } => 1,
        }
    }
}

/// The supervised unit: public listener, backing process, health prober.
pub struct Bridge {
    ctx: SupervisorContext,
    monitor: ServerMonitorConfig,
    restart: RestartPolicy,
}

impl Bridge {
    #[tracing::instrument(skip(config), fields(public_port = config.listen.port, internal_port = config.backing.port))]
    pub fn new(config: Config) -> Self {
        tracing::info!("Creating new Bridge");
        let monitor = ServerMonitorConfig::from(&config);
        let restart = RestartPolicy {
            delay: config.backing.restart_delay(),
        };
        Self {
            ctx: SupervisorContext::new(config),
            monitor,
            restart,
        }
    }

    /// Override the probe timing derived from the configuration.
    pub fn with_monitor_config(mut self, monitor: ServerMonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn context(&self) -> &SupervisorContext {
        &self.ctx
    }

    /// Run with the real backing process and HTTP prober until a
    /// termination signal or health escalation.
    pub async fn run(self) -> Result<UnitExit> {
        let launcher = CommandLauncher::new(LaunchSpec::from(&self.ctx.config.backing));
        let check = HttpHealthCheck::from_config(&self.ctx.config)?;
        self.run_with(launcher, check, shutdown_signal()).await
    }

    /// Run with injected collaborators.
    ///
    /// `shutdown` resolving has the same effect as a termination signal.
    /// Shutdown order: stop accepting and close the listener, stop the
    /// backing process, then mark the unit terminated.
    ///
    /// # Errors
    ///
    /// Only startup failures (binding the listener, building clients) are
    /// returned; everything after that ends in a [`UnitExit`].
    pub async fn run_with<L, C, F>(self, launcher: L, check: C, shutdown: F) -> Result<UnitExit>
    where
        L: Launcher + 'static,
        C: HealthCheck + 'static,
        F: Future<Output = ()>,
    {
        let ctx = self.ctx;
        let config = ctx.config.clone();
        report_environment(&config);

        let proxy = ProxyServer::start(ProxyState::new(ctx.clone())?)?;
        ctx.lifecycle.mark_listening();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = ChildProcessManager::new(
            launcher,
            self.restart,
            ctx.child.clone(),
            ctx.lifecycle.clone(),
        );
        let manager_task = tokio::spawn(manager.run(shutdown_rx.clone()));

        let monitor = HealthMonitor::new(
            check,
            ctx.health.clone(),
            ctx.lifecycle.clone(),
            self.monitor,
        );
        let mut monitor_task = tokio::spawn(monitor.run(shutdown_rx));
        let mut monitor_done = false;

        tokio::pin!(shutdown);
        let exit = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Termination signal received");
                UnitExit::Signal
            }
            result = &mut monitor_task => {
                monitor_done = true;
                match result {
                    Ok(MonitorExit::Escalated { consecutive_failures }) => {
                        UnitExit::Escalated { consecutive_failures }
                    }
                    // The sender is still alive here, so the monitor cannot
                    // have observed a shutdown.
                    Ok(MonitorExit::Stopped) => UnitExit::Signal,
                    Err(e) => {
                        tracing::error!(error = %e, "Health monitor task failed");
                        UnitExit::Escalated {
                            consecutive_failures: ctx.health.consecutive_failures(),
                        }
                    }
                }
            }
        };

        ctx.lifecycle
            .record(LifecycleEvent::ShutdownRequested, Some(format!("{:?}", exit)));

        proxy.stop().await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = join_manager(manager_task).await {
            tracing::error!(error = %e, "Child process manager did not stop cleanly");
        }
        if !monitor_done {
            let _ = monitor_task.await;
        }

        ctx.lifecycle.mark_terminated(Some(format!("{:?}", exit)));
        tracing::info!(exit = ?exit, "Unit terminated");
        Ok(exit)
    }
}

/// Log the resolved configuration once, and whether each `reportEnv`
/// variable is present. Values are never logged.
fn report_environment(config: &Config) {
    let env_keys: Vec<&String> = config.backing.env.keys().collect();
    tracing::info!(
        public = %format!("{}:{}", config.listen.address, config.listen.port),
        target = %config.backing.base_url(),
        command = %config.backing.command,
        args = ?config.backing.args,
        env_keys = ?env_keys,
        port_env = %config.backing.port_env,
        streaming_enabled = config.backing.streaming_enabled,
        streaming_path = %config.backing.streaming_path,
        public_streaming_paths = ?config.proxy.streaming_paths,
        health_path = %config.backing.health_path,
        failure_threshold = config.health.failure_threshold,
        "Resolved configuration"
    );

    for name in &config.report_env {
        let present = std::env::var_os(name).is_some_and(|v| !v.is_empty());
        if present {
            tracing::info!(var = %name, "Environment variable present");
        } else {
            tracing::warn!(var = %name, "Environment variable missing");
        }
    }
}

/// Resolves on SIGTERM or Ctrl-C.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
