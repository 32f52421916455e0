use crate::config::Config;
use crate::error::{Error, Result};
use crate::server::lifecycle::{LifecycleEvent, UnitLifecycle};
use crate::server::manager::shutdown_requested;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(String),
}

/// Backing process health as reported by the prober
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerHealth {
    /// Last probe succeeded
    Healthy,
    /// Failing, but below the escalation threshold
    Degraded,
    /// Threshold reached
    Unhealthy,
    /// No probe has succeeded yet
    Unknown,
}

/// One liveness check against the backing process.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

/// `GET` the backing liveness path; any 2xx is healthy.
pub struct HttpHealthCheck {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build probe client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.backing.url_for(&config.backing.health_path),
            config.probe_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self) -> ProbeOutcome {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Healthy,
            Ok(response) => ProbeOutcome::Unhealthy(format!("status {}", response.status())),
            Err(e) => ProbeOutcome::Unhealthy(Error::upstream(e).to_string()),
        }
    }
}

/// Serializable view of [`HealthState`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub health: ServerHealth,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub total_successes: u64,
    pub last_error: Option<String>,
}

/// Consecutive-failure counter. Written only by the [`HealthMonitor`].
///
/// Any success resets the counter to zero; there is no carry-over between
/// successes.
#[derive(Debug)]
pub struct HealthState {
    failures: AtomicU32,
    successes: AtomicU64,
    threshold: u32,
    last_error: Mutex<Option<String>>,
    last_success: Mutex<Option<Instant>>,
}

impl HealthState {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            successes: AtomicU64::new(0),
            threshold,
            last_error: Mutex::new(None),
            last_success: Mutex::new(None),
        }
    }

    /// Apply a probe outcome and return the new failure count.
    pub fn record(&self, outcome: &ProbeOutcome) -> u32 {
        match outcome {
            ProbeOutcome::Healthy => {
                self.successes.fetch_add(1, Ordering::SeqCst);
                match self.last_success.lock() {
                    Ok(mut guard) => *guard = Some(Instant::now()),
                    Err(poisoned) => *poisoned.into_inner() = Some(Instant::now()),
                }
                self.set_last_error(None);
                self.failures.swap(0, Ordering::SeqCst);
                0
            }
            ProbeOutcome::Unhealthy(reason) => {
                self.set_last_error(Some(reason.clone()));
                self.failures.fetch_add(1, Ordering::SeqCst) + 1
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn threshold_reached(&self) -> bool {
        self.consecutive_failures() >= self.threshold
    }

    pub fn has_succeeded(&self) -> bool {
        self.successes.load(Ordering::SeqCst) > 0
    }

    /// Has any probe succeeded at or after `since`?
    pub fn succeeded_since(&self, since: Instant) -> bool {
        let last = match self.last_success.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        last.is_some_and(|at| at >= since)
    }

    pub fn health(&self) -> ServerHealth {
        let failures = self.consecutive_failures();
        if failures >= self.threshold {
            ServerHealth::Unhealthy
        } else if !self.has_succeeded() {
            ServerHealth::Unknown
        } else if failures == 0 {
            ServerHealth::Healthy
        } else {
            ServerHealth::Degraded
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_error = match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        HealthSnapshot {
            health: self.health(),
            consecutive_failures: self.consecutive_failures(),
            failure_threshold: self.threshold,
            total_successes: self.successes.load(Ordering::SeqCst),
            last_error,
        }
    }

    fn set_last_error(&self, error: Option<String>) {
        match self.last_error.lock() {
            Ok(mut guard) => *guard = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone)]
pub struct ServerMonitorConfig {
    /// Check interval
    pub check_interval: Duration,
    /// Health check timeout
    pub health_check_timeout: Duration,
    /// Consecutive failures that terminate the unit
    pub max_consecutive_failures: u32,
    /// Delay before the first probe
    pub initial_delay: Duration,
}

impl Default for ServerMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            health_check_timeout: Duration::from_secs(2),
            max_consecutive_failures: 5,
            initial_delay: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for ServerMonitorConfig {
    fn from(config: &Config) -> Self {
        Self {
            check_interval: config.probe_interval(),
            health_check_timeout: config.probe_timeout(),
            max_consecutive_failures: config.health.failure_threshold,
            initial_delay: Duration::from_secs(config.health.initial_delay_secs),
        }
    }
}

/// Why the monitor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The failure threshold was reached; the unit must terminate.
    Escalated { consecutive_failures: u32 },
    /// Shutdown was requested elsewhere.
    Stopped,
}

/// Periodic liveness prober with whole-unit escalation.
///
/// A wedged loopback stack or corrupted child state is not something a
/// respawn reliably fixes, so sustained failure ends the whole unit and
/// leaves recovery to the outer orchestrator.
pub struct HealthMonitor<C: HealthCheck> {
    check: C,
    state: Arc<HealthState>,
    lifecycle: Arc<UnitLifecycle>,
    config: ServerMonitorConfig,
}

impl<C: HealthCheck> HealthMonitor<C> {
    pub fn new(
        check: C,
        state: Arc<HealthState>,
        lifecycle: Arc<UnitLifecycle>,
        config: ServerMonitorConfig,
    ) -> Self {
        Self {
            check,
            state,
            lifecycle,
            config,
        }
    }

    /// Run one probe, bounded by the configured timeout, and record it.
    pub async fn probe_once(&self) -> u32 {
        let outcome = match time::timeout(self.config.health_check_timeout, self.check.check()).await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Unhealthy(format!(
                "probe timed out after {}ms",
                self.config.health_check_timeout.as_millis()
            )),
        };

        let was_failing = self.state.consecutive_failures() > 0;
        let failures = self.state.record(&outcome);

        match &outcome {
            ProbeOutcome::Healthy => {
                if was_failing {
                    tracing::info!("Backing process health recovered");
                    self.lifecycle.record(LifecycleEvent::ProbeRecovered, None);
                } else {
                    tracing::trace!("Health probe ok");
                }
            }
            ProbeOutcome::Unhealthy(reason) => {
                tracing::warn!(
                    reason = %reason,
                    consecutive_failures = failures,
                    threshold = self.config.max_consecutive_failures,
                    "Health probe failed"
                );
                self.lifecycle.record(
                    LifecycleEvent::ProbeFailed,
                    Some(format!("{} ({} consecutive)", reason, failures)),
                );
            }
        }

        failures
    }

    /// Probe on a fixed interval until escalation or shutdown.
    #[tracing::instrument(skip_all, fields(interval_ms = self.config.check_interval.as_millis() as u64))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> MonitorExit {
        tokio::select! {
            _ = time::sleep(self.config.initial_delay) => {}
            _ = shutdown_requested(&mut shutdown) => return MonitorExit::Stopped,
        }

        let mut interval = time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_requested(&mut shutdown) => return MonitorExit::Stopped,
            }

            let failures = self.probe_once().await;
            if failures >= self.config.max_consecutive_failures {
                tracing::error!(
                    consecutive_failures = failures,
                    "Backing process failed too many health probes, terminating unit"
                );
                self.lifecycle.record(
                    LifecycleEvent::Escalated,
                    Some(format!("{} consecutive probe failures", failures)),
                );
                return MonitorExit::Escalated {
                    consecutive_failures: failures,
                };
            }
        }
    }
}
