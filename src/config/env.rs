//! Environment overrides for the bridge configuration.
//!
//! The hosting platform configures the unit almost entirely through
//! environment variables. Each recognized variable maps onto exactly one
//! [`Config`] field; unknown variables are ignored and simply inherited by
//! the backing process.

use super::parser::Config;
use crate::error::{Error, Result};
use std::str::FromStr;

/// Names the bridge reads from the environment.
pub mod vars {
    pub const CONFIG_FILE: &str = "BRIDGE_CONFIG";
    pub const PORT: &str = "PORT";
    pub const BIND_ADDRESS: &str = "BRIDGE_BIND_ADDRESS";
    pub const WORKERS: &str = "BRIDGE_WORKERS";
    pub const IDLE_TIMEOUT_SECS: &str = "BRIDGE_IDLE_TIMEOUT_SECS";
    pub const CHILD_COMMAND: &str = "BRIDGE_CHILD_COMMAND";
    pub const CHILD_ARGS: &str = "BRIDGE_CHILD_ARGS";
    pub const INTERNAL_PORT: &str = "BRIDGE_INTERNAL_PORT";
    pub const ENABLE_SSE: &str = "ENABLE_SSE";
    pub const SSE_PATH: &str = "BRIDGE_SSE_PATH";
    pub const CHILD_HEALTH_PATH: &str = "BRIDGE_CHILD_HEALTH_PATH";
    pub const RESTART_DELAY_MS: &str = "BRIDGE_RESTART_DELAY_MS";
    pub const PROBE_INTERVAL_SECS: &str = "BRIDGE_PROBE_INTERVAL_SECS";
    pub const PROBE_TIMEOUT_MS: &str = "BRIDGE_PROBE_TIMEOUT_MS";
    pub const FAILURE_THRESHOLD: &str = "BRIDGE_FAILURE_THRESHOLD";
    pub const PROBE_INITIAL_DELAY_SECS: &str = "BRIDGE_PROBE_INITIAL_DELAY_SECS";
    pub const PROXY_TIMEOUT_SECS: &str = "BRIDGE_PROXY_TIMEOUT_SECS";
    pub const STREAM_KEEPALIVE_SECS: &str = "BRIDGE_STREAM_KEEPALIVE_SECS";
    pub const REPORT_ENV: &str = "BRIDGE_REPORT_ENV";
}

impl Config {
    /// Resolve the configuration for this process.
    ///
    /// Defaults, then the file named by `BRIDGE_CONFIG` (if set), then the
    /// process environment, then validation.
    pub fn load() -> Result<Self> {
        let lookup = |name: &str| std::env::var(name).ok();

        let base = match lookup(vars::CONFIG_FILE) {
            Some(path) => {
                tracing::info!(config_path = %path, "Loading configuration from file");
                Config::from_file(path)?
            }
            None => Config::default(),
        };

        let config = base.with_env(lookup)?;
        super::validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Taking the lookup as a closure keeps this testable without touching
    /// the real process environment.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(port) = get(vars::PORT) {
            self.listen.port = parse(vars::PORT, &port)?;
        }
        if let Some(address) = get(vars::BIND_ADDRESS) {
            self.listen.address = address;
        }
        if let Some(workers) = get(vars::WORKERS) {
            self.listen.workers = parse(vars::WORKERS, &workers)?;
        }
        if let Some(secs) = get(vars::IDLE_TIMEOUT_SECS) {
            self.listen.idle_timeout_secs = parse(vars::IDLE_TIMEOUT_SECS, &secs)?;
        }

        if let Some(command) = get(vars::CHILD_COMMAND) {
            self.backing.command = command;
        }
        if let Some(args) = get(vars::CHILD_ARGS) {
            self.backing.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(port) = get(vars::INTERNAL_PORT) {
            self.backing.port = parse(vars::INTERNAL_PORT, &port)?;
        }
        if let Some(flag) = get(vars::ENABLE_SSE) {
            self.backing.streaming_enabled = parse_flag(vars::ENABLE_SSE, &flag)?;
        }
        if let Some(path) = get(vars::SSE_PATH) {
            self.backing.streaming_path = path;
        }
        if let Some(path) = get(vars::CHILD_HEALTH_PATH) {
            self.backing.health_path = path;
        }
        if let Some(ms) = get(vars::RESTART_DELAY_MS) {
            self.backing.restart_delay_ms = parse(vars::RESTART_DELAY_MS, &ms)?;
        }

        if let Some(secs) = get(vars::PROBE_INTERVAL_SECS) {
            self.health.interval_secs = parse(vars::PROBE_INTERVAL_SECS, &secs)?;
        }
        if let Some(ms) = get(vars::PROBE_TIMEOUT_MS) {
            self.health.timeout_ms = parse(vars::PROBE_TIMEOUT_MS, &ms)?;
        }
        if let Some(n) = get(vars::FAILURE_THRESHOLD) {
            self.health.failure_threshold = parse(vars::FAILURE_THRESHOLD, &n)?;
        }
        if let Some(secs) = get(vars::PROBE_INITIAL_DELAY_SECS) {
            self.health.initial_delay_secs = parse(vars::PROBE_INITIAL_DELAY_SECS, &secs)?;
        }

        if let Some(secs) = get(vars::PROXY_TIMEOUT_SECS) {
            self.proxy.timeout_secs = parse(vars::PROXY_TIMEOUT_SECS, &secs)?;
        }
        if let Some(secs) = get(vars::STREAM_KEEPALIVE_SECS) {
            self.proxy.stream_keepalive_secs = Some(parse(vars::STREAM_KEEPALIVE_SECS, &secs)?);
        }

        if let Some(names) = get(vars::REPORT_ENV) {
            self.report_env = names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(self)
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::ConfigParse(format!("{}={:?}: {}", name, value, e)))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::ConfigParse(format!(
            "{}={:?}: expected a boolean",
            name, value
        ))),
    }
}
