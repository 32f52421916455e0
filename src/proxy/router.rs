//! Public endpoint routing.
//!
//! Every inbound request is classified into a [`Route`] before any I/O
//! happens. Precedence, first match wins:
//!
//! 1. liveness path
//! 2. ping path
//! 3. diagnostic paths (when enabled)
//! 4. `GET` on a streaming path (when streaming is enabled)
//! 5. WebSocket upgrades and `CONNECT`
//! 6. everything else goes to the gateway, including other upgrade
//!    tokens, which are forwarded as plain requests
//!
//! `OPTIONS` never reaches the router; the CORS middleware answers it first.

use crate::config::Config;
use crate::proxy::headers::{is_websocket_upgrade, wants_upgrade};
use actix_web::http::Method;
use actix_web::http::header::HeaderMap;

/// Where a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Liveness,
    Ping,
    ChildHealth,
    StreamCheck,
    Status,
    TestStream,
    /// Event-stream tunnel to the backing streaming path
    Tunnel,
    /// WebSocket upgrade or `CONNECT`, forwarded as a raw byte tunnel
    Upgrade,
    /// Ordinary reverse-proxied request
    Gateway,
}

impl Route {
    /// Answered without touching the backing process?
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Route::Tunnel | Route::Upgrade | Route::Gateway)
    }
}

/// Path table resolved once from configuration.
#[derive(Debug, Clone)]
pub struct RouteTable {
    liveness: String,
    ping: String,
    diagnostics: Option<DiagnosticPaths>,
    streaming_paths: Vec<String>,
    streaming_enabled: bool,
}

#[derive(Debug, Clone)]
struct DiagnosticPaths {
    child_health: String,
    stream_check: String,
    status: String,
    test_stream: String,
}

impl RouteTable {
    pub fn from_config(config: &Config) -> Self {
        let routes = &config.routes;
        let diagnostics = routes.diagnostics.then(|| DiagnosticPaths {
            child_health: routes.child_health_path.clone(),
            stream_check: routes.stream_check_path.clone(),
            status: routes.status_path.clone(),
            test_stream: routes.test_stream_path.clone(),
        });

        Self {
            liveness: routes.liveness_path.clone(),
            ping: routes.ping_path.clone(),
            diagnostics,
            streaming_paths: config.proxy.streaming_paths.clone(),
            streaming_enabled: config.backing.streaming_enabled,
        }
    }

    /// Classify a request by method, path and headers.
    pub fn resolve(&self, method: &Method, path: &str, headers: &HeaderMap) -> Route {
        if path == self.liveness {
            return Route::Liveness;
        }
        if path == self.ping {
            return Route::Ping;
        }

        if let Some(diag) = &self.diagnostics {
            if path == diag.child_health {
                return Route::ChildHealth;
            }
            if path == diag.stream_check {
                return Route::StreamCheck;
            }
            if path == diag.status {
                return Route::Status;
            }
            if path == diag.test_stream {
                return Route::TestStream;
            }
        }

        let upgrade = method == Method::CONNECT || is_websocket_upgrade(headers);
        if !upgrade && wants_upgrade(headers) {
            tracing::debug!(path = %path, "Upgrade token not tunnelled, forwarding as a plain request");
        }

        if self.streaming_enabled
            && method == Method::GET
            && !upgrade
            && self.streaming_paths.iter().any(|p| p == path)
        {
            return Route::Tunnel;
        }

        if upgrade {
            return Route::Upgrade;
        }

        Route::Gateway
    }
}
