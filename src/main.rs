//! Shakecam service binary.
//!
//! Startup order: load configuration, initialize tracing, validate the
//! configuration (the only fatal error surface), wire the collaborators,
//! then run the polling loop until the process is terminated.

use anyhow::{Context, Result};
use config::ConfigError;
use shakecam::camera::StillCommandCamera;
use shakecam::config::{LoggingConfig, ShakeCamConfig};
use shakecam::controller::CaptureController;
use shakecam::pusher::GitPusher;
use shakecam::sensor::IioAccelerometer;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, file_config_error) = load_config()?;

    init_tracing(&config.logging);

    // Deferred from load_config, which runs before the subscriber exists.
    if let Some(e) = file_config_error {
        warn!(error = %e, "Failed to load config from files, using environment variables only");
    }

    info!(
        service = "shakecam",
        version = env!("CARGO_PKG_VERSION"),
        identity = %config.capture.identity,
        "Starting shake capture service"
    );

    config
        .validate()
        .context("Invalid configuration, refusing to start")?;

    let accelerometer = IioAccelerometer::open(config.sampling.device_path.clone())
        .await
        .context("Failed to open accelerometer")?;
    let camera = StillCommandCamera::new(&config.capture);
    let pusher = GitPusher::new(&config.push);

    let mut controller = CaptureController::new(config, accelerometer, camera, pusher);

    tokio::select! {
        result = controller.run() => {
            result.context("Capture loop failed")?;
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Load configuration from files, falling back to environment only.
///
/// Runs before tracing is initialized, so a file-load failure is
/// returned alongside the config for the caller to log once the
/// subscriber is up, instead of being dropped silently.
fn load_config() -> Result<(ShakeCamConfig, Option<ConfigError>)> {
    match ShakeCamConfig::load() {
        Ok(config) => Ok((config, None)),
        Err(file_error) => {
            let config = ShakeCamConfig::from_env().context("Failed to load configuration")?;
            Ok((config, Some(file_error)))
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_default_config_loads_without_fallback() {
        // cargo test runs from the crate root, where config/default.toml
        // lives; the file source must win, report no fallback, and pass
        // validation.
        let (config, file_error) = load_config().unwrap();
        assert!(file_error.is_none());
        config.validate().unwrap();
    }
}
