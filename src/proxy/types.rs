//! Serializable records returned by the diagnostic endpoints.

use crate::server::{ChildSnapshot, HealthSnapshot, UnitEvent, UnitState};
use serde::Serialize;

/// Result of an ad-hoc probe of the backing process.
///
/// Probe failures are reported as data (`ok: false` plus `error`), never
/// as an HTTP error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub ok: bool,
    pub url: String,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeReport {
    pub fn failed(url: String, error: impl ToString, elapsed_ms: u64) -> Self {
        Self {
            ok: false,
            url,
            status: None,
            content_type: None,
            body: None,
            error: Some(error.to_string()),
            elapsed_ms,
        }
    }
}

/// Unit-wide status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: UnitState,
    pub uptime_secs: u64,
    pub public_port: u16,
    pub target: String,
    pub streaming_enabled: bool,
    pub child: ChildSnapshot,
    pub health: HealthSnapshot,
    pub recent_events: Vec<UnitEvent>,
}
