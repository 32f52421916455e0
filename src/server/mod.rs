/// Backing process supervision for Bridge Runner.
///
/// This module owns everything that runs independently of request handling:
/// launching and relaunching the backing process, relaying its output, and
/// probing its liveness. All public components are instrumented with
/// `tracing` spans.
///
/// # Components
///
/// * `process` - The OS-level backing process and the `Launcher` seam
/// * `manager` - Restart loop with a constant backoff
/// * `monitor` - Health probing and whole-unit escalation
/// * `lifecycle` - Unit state machine and event history
///
/// # Examples
///
/// Supervising a process until shutdown:
///
/// ```no_run
/// use bridge_runner::server::{
///     ChildProcessManager, ChildState, CommandLauncher, LaunchSpec, RestartPolicy, UnitLifecycle,
/// };
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn run() {
/// let spec = LaunchSpec {
///     command: "node".to_string(),
///     args: vec!["server.js".to_string()],
///     env: HashMap::new(),
///     shutdown_grace: Duration::from_secs(5),
/// };
/// let manager = ChildProcessManager::new(
///     CommandLauncher::new(spec),
///     RestartPolicy { delay: Duration::from_secs(1) },
///     Arc::new(ChildState::new()),
///     Arc::new(UnitLifecycle::new()),
/// );
///
/// let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
/// let task = tokio::spawn(manager.run(shutdown_rx));
/// // ... later
/// shutdown_tx.send(true).unwrap();
/// task.await.unwrap();
/// # }
/// ```
pub mod lifecycle;
pub mod manager;
pub mod monitor;
mod process;

pub use lifecycle::{LifecycleEvent, UnitEvent, UnitLifecycle, UnitState};
pub use manager::{ChildProcessManager, ChildSnapshot, ChildState, ManagerExit, RestartPolicy};
pub use monitor::{
    HealthCheck, HealthMonitor, HealthSnapshot, HealthState, HttpHealthCheck, MonitorExit,
    ProbeOutcome, ServerHealth, ServerMonitorConfig,
};
pub use process::{
    BackingProcess, ChildHandle, CommandLauncher, LaunchSpec, Launcher, ProcessId,
};
