use anyhow::Context;
use bridge_runner::{Bridge, Config};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

/// Exit code for configuration failures
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG wins; otherwise info
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = match Config::load().context("Failed to load configuration") {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Refusing to start");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Bridge failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<u8> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting bridge-runner");

    let exit = Bridge::new(config)
        .run()
        .await
        .context("Failed to start the unit")?;

    Ok(exit.exit_code() as u8)
}
