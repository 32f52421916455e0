use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Public listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenConfig {
    /// Bind address for the public listener (all interfaces by default).
    pub address: String,
    /// Public port, normally supplied by the hosting platform via `PORT`.
    pub port: u16,
    /// Number of Actix Web workers.
    pub workers: usize,
    /// Keep-alive timeout for idle client sockets.
    pub idle_timeout_secs: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 3000,
            workers: 1,
            idle_timeout_secs: 3600,
        }
    }
}

/// How to launch the backing process and where it listens.
///
/// The startup contract of the backing process is deliberately pluggable:
/// the command line, the name of the variable carrying the port, and the
/// streaming path are all configuration.
///
/// # Examples
///
/// ```
/// use bridge_runner::config::BackingConfig;
///
/// let backing = BackingConfig {
///     command: "npx".to_string(),
///     args: vec!["-y".to_string(), "some-http-server".to_string()],
///     ..BackingConfig::default()
/// };
/// assert_eq!(backing.base_url(), "http://127.0.0.1:10000");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackingConfig {
    /// Command to execute. This can be an absolute path or a command on `PATH`.
    pub command: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Extra environment variables, layered over the inherited environment.
    pub env: HashMap<String, String>,
    /// Loopback host the backing process binds.
    pub host: String,
    /// Loopback port the backing process binds. Never the public port.
    pub port: u16,
    /// Name of the environment variable that tells the child its port.
    pub port_env: String,
    /// Liveness path served by the backing process.
    pub health_path: String,
    /// Streaming path served by the backing process.
    pub streaming_path: String,
    /// Whether the backing process should enable its event stream.
    pub streaming_enabled: bool,
    /// Constant delay between a child exit and the next launch.
    pub restart_delay_ms: u64,
    /// Grace period between SIGTERM and SIGKILL on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for BackingConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            host: "127.0.0.1".to_string(),
            port: 10000,
            port_env: "PORT".to_string(),
            health_path: "/health".to_string(),
            streaming_path: "/sse".to_string(),
            streaming_enabled: true,
            restart_delay_ms: 1000,
            shutdown_grace_ms: 5000,
        }
    }
}

impl BackingConfig {
    /// Base URL of the loopback target, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Absolute URL for a path (and optional query) on the loopback target.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url(), path_and_query)
    }

    /// Environment overrides applied on top of the inherited environment.
    ///
    /// Fixed overrides win over `env` so the child always binds the
    /// loopback side of the bridge.
    pub fn child_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.insert(self.port_env.clone(), self.port.to_string());
        env.insert("HOST".to_string(), self.host.clone());
        env.insert(
            "ENABLE_SSE".to_string(),
            self.streaming_enabled.to_string(),
        );
        env
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Health prober timing and escalation threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    pub timeout_ms: u64,
    /// Consecutive failures that terminate the whole unit.
    pub failure_threshold: u32,
    /// Delay before the first probe after startup.
    pub initial_delay_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_ms: 2000,
            failure_threshold: 5,
            initial_delay_secs: 10,
        }
    }
}

/// Gateway and tunnel behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxySettings {
    /// Response-wait timeout for proxied requests.
    pub timeout_secs: u64,
    /// Largest request body the gateway will buffer.
    pub max_body_bytes: usize,
    /// Public paths tunnelled to the backing streaming path.
    pub streaming_paths: Vec<String>,
    /// Emit `: keep-alive` comments during upstream silence.
    pub stream_keepalive_secs: Option<u64>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            max_body_bytes: 10 * 1024 * 1024,
            streaming_paths: vec!["/sse".to_string()],
            stream_keepalive_secs: None,
        }
    }
}

/// Paths answered locally by the public listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteConfig {
    pub liveness_path: String,
    pub ping_path: String,
    /// Enables the diagnostic paths below.
    pub diagnostics: bool,
    pub child_health_path: String,
    pub stream_check_path: String,
    pub status_path: String,
    pub test_stream_path: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            liveness_path: "/health".to_string(),
            ping_path: "/ping".to_string(),
            diagnostics: true,
            child_health_path: "/_child/health".to_string(),
            stream_check_path: "/_child/sse-check".to_string(),
            status_path: "/_bridge/status".to_string(),
            test_stream_path: "/test-sse".to_string(),
        }
    }
}

/// Main configuration for the bridge.
///
/// Resolved once at startup: defaults, then an optional file, then the
/// environment (see [`Config::load`]).
///
/// # JSON Schema
///
/// ```json
/// {
///   "listen": { "port": 3000 },
///   "backing": {
///     "command": "npx",
///     "args": ["-y", "some-http-server"],
///     "port": 10000,
///     "streamingPath": "/sse"
///   },
///   "health": { "failureThreshold": 5 },
///   "reportEnv": ["API_KEY"]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub listen: ListenConfig,
    pub backing: BackingConfig,
    pub health: HealthConfig,
    pub proxy: ProxySettings,
    pub routes: RouteConfig,
    /// Variables whose presence (never value) is reported at startup.
    pub report_env: Vec<String>,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not conform to
    /// the expected schema.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.health.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health.timeout_ms)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.listen.idle_timeout_secs)
    }
}
