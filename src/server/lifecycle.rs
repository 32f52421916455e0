use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Most recent events kept for diagnostics
const MAX_EVENTS: usize = 200;

/// Unit-level state.
///
/// `Listening` is reached as soon as the public listener binds, whatever the
/// child is doing. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    Starting,
    Listening,
    ChildStarting,
    Healthy,
    Degraded,
    Terminated,
}

/// Unit lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Listening,
    ChildStarted,
    ChildExited,
    ChildStopped,
    LaunchFailed,
    ProbeRecovered,
    ProbeFailed,
    Escalated,
    ShutdownRequested,
    Terminated,
}

/// Unit lifecycle event record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitEvent {
    pub event: LifecycleEvent,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub details: Option<String>,
}

/// Bounded event history plus the two unit-level flags.
///
/// `listening` is set by the listener startup and `terminated` by the unit
/// shutdown path; each flag has exactly one writer. The full [`UnitState`]
/// is derived by [`crate::SupervisorContext::state`].
pub struct UnitLifecycle {
    events: Mutex<VecDeque<UnitEvent>>,
    listening: AtomicBool,
    terminated: AtomicBool,
    started: Instant,
}

impl UnitLifecycle {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(MAX_EVENTS)),
            listening: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    /// Record a lifecycle event
    pub fn record(&self, event: LifecycleEvent, details: Option<String>) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let entry = UnitEvent {
            event,
            timestamp_ms,
            details,
        };

        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if events.len() >= MAX_EVENTS {
            events.pop_front();
        }
        events.push_back(entry);
    }

    /// Recent events, newest first
    pub fn recent_events(&self, limit: Option<usize>) -> Vec<UnitEvent> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let limit = limit.unwrap_or(events.len());
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn mark_listening(&self) {
        self.listening.store(true, Ordering::SeqCst);
        self.record(LifecycleEvent::Listening, None);
    }

    pub fn mark_terminated(&self, details: Option<String>) {
        self.terminated.store(true, Ordering::SeqCst);
        self.record(LifecycleEvent::Terminated, details);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for UnitLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
