use crate::config::{BackingConfig, Config, HealthConfig, RouteConfig};
use crate::error::{Error, Result};

/// Validates the backing process configuration.
pub fn validate_backing_config(config: &BackingConfig) -> Result<()> {
    if config.command.trim().is_empty() {
        return Err(Error::ConfigInvalid(
            "No backing command configured (set BRIDGE_CHILD_COMMAND)".to_string(),
        ));
    }

    if config.port == 0 {
        return Err(Error::ConfigInvalid(
            "Backing port must be non-zero".to_string(),
        ));
    }

    if config.port_env.trim().is_empty() {
        return Err(Error::ConfigInvalid(
            "Backing port variable name is empty".to_string(),
        ));
    }

    validate_path("backing.healthPath", &config.health_path)?;
    validate_path("backing.streamingPath", &config.streaming_path)?;

    Ok(())
}

/// Validates probe timing and the escalation threshold.
pub fn validate_health_config(config: &HealthConfig) -> Result<()> {
    if config.failure_threshold == 0 {
        return Err(Error::ConfigInvalid(
            "Failure threshold must be at least 1".to_string(),
        ));
    }

    if config.interval_secs == 0 {
        return Err(Error::ConfigInvalid(
            "Probe interval must be non-zero".to_string(),
        ));
    }

    // A probe must finish before the next one is due.
    if config.timeout_ms == 0 || config.timeout_ms > config.interval_secs * 1000 {
        return Err(Error::ConfigInvalid(format!(
            "Probe timeout {}ms must be between 1ms and the probe interval ({}s)",
            config.timeout_ms, config.interval_secs
        )));
    }

    Ok(())
}

/// Validates the locally answered paths against the streaming paths.
pub fn validate_routes(routes: &RouteConfig, streaming_paths: &[String]) -> Result<()> {
    let mut builtin = vec![
        ("routes.livenessPath", &routes.liveness_path),
        ("routes.pingPath", &routes.ping_path),
    ];
    if routes.diagnostics {
        builtin.extend([
            ("routes.childHealthPath", &routes.child_health_path),
            ("routes.streamCheckPath", &routes.stream_check_path),
            ("routes.statusPath", &routes.status_path),
            ("routes.testStreamPath", &routes.test_stream_path),
        ]);
    }

    for (field, path) in &builtin {
        validate_path(field, path)?;
    }

    for (i, (field, path)) in builtin.iter().enumerate() {
        if let Some((other, _)) = builtin[i + 1..].iter().find(|(_, p)| p == path) {
            return Err(Error::ConfigInvalid(format!(
                "{} and {} both use '{}'",
                field, other, path
            )));
        }
        if streaming_paths.iter().any(|p| p == *path) {
            return Err(Error::ConfigInvalid(format!(
                "{} '{}' collides with a streaming path",
                field, path
            )));
        }
    }

    for path in streaming_paths {
        validate_path("proxy.streamingPaths", path)?;
    }

    Ok(())
}

fn validate_path(field: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::ConfigInvalid(format!(
            "{} must start with '/', got '{}'",
            field, path
        )));
    }
    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_backing_config(&config.backing)?;
    validate_health_config(&config.health)?;
    validate_routes(&config.routes, &config.proxy.streaming_paths)?;

    if config.listen.port == 0 {
        return Err(Error::ConfigInvalid(
            "Public port must be non-zero".to_string(),
        ));
    }

    if config.listen.port == config.backing.port {
        return Err(Error::ConfigInvalid(format!(
            "Public port and backing port are both {}",
            config.listen.port
        )));
    }

    if config.listen.workers == 0 {
        return Err(Error::ConfigInvalid(
            "At least one worker is required".to_string(),
        ));
    }

    Ok(())
}
