//! Configuration management for the shake capture service.
//!
//! This module handles loading and validating configuration from
//! configuration files and environment variables.

use crate::magnitude::MagnitudePolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the shake capture service.
#[derive(Debug, Clone, Deserialize)]
pub struct ShakeCamConfig {
    /// Shake detection configuration
    pub detector: DetectorConfig,

    /// Sensor polling configuration
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Camera and image capture configuration
    pub capture: CaptureConfig,

    /// Git push configuration
    #[serde(default)]
    pub push: PushConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shake detector configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Magnitude threshold in m/s² that a sample must strictly exceed
    /// to count as a shake. What this number means depends entirely on
    /// `magnitude_policy`: under `raw_norm` a resting sensor already
    /// reads ~9.8, under `gravity_deviation` it reads ~0.
    pub threshold: f64,

    /// How the 3-axis sample is reduced to the scalar compared against
    /// `threshold`. Required: there is no safe default, because the right
    /// choice depends on whether the sensor's rest output includes gravity.
    pub magnitude_policy: MagnitudePolicy,

    /// Minimum seconds between two accepted triggers. Must be >= 1 so
    /// that second-resolution filenames cannot collide.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Sensor polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Interval between accelerometer polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after a capture attempt (success or failure) before
    /// sampling resumes, letting the hardware settle. Distinct from the
    /// detector cooldown, which gates logical triggers.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Linux IIO sysfs directory for the accelerometer
    #[serde(default = "default_device_path")]
    pub device_path: PathBuf,

    /// Log accumulated loop statistics every N polling cycles
    /// (0 disables periodic stats logging)
    #[serde(default = "default_stats_interval_cycles")]
    pub stats_interval_cycles: u64,
}

/// Camera and image capture configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Identity string embedded in every image filename
    pub identity: String,

    /// Directory image files are written to
    pub image_directory: PathBuf,

    /// Still-capture command invoked for each photo
    #[serde(default = "default_camera_command")]
    pub command: String,

    /// Extra arguments passed to the capture command before `-o <path>`
    #[serde(default = "default_camera_args")]
    pub extra_args: Vec<String>,

    /// Maximum seconds to wait for the capture command
    #[serde(default = "default_camera_timeout_secs")]
    pub timeout_secs: u64,
}

/// Git push configuration for best-effort image persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Whether to push captured images at all (disable when offline)
    #[serde(default = "default_push_enabled")]
    pub enabled: bool,

    /// Local clone of the repository images are committed to
    #[serde(default)]
    pub repo_path: PathBuf,

    /// Remote name to pull from and push to
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Commit message used for every image commit
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_cooldown_secs() -> u64 {
    5
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_settle_delay_ms() -> u64 {
    2000
}
fn default_device_path() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}
fn default_stats_interval_cycles() -> u64 {
    600
}
fn default_camera_command() -> String {
    "libcamera-still".to_string()
}
fn default_camera_args() -> Vec<String> {
    vec!["-n".to_string(), "--immediate".to_string()]
}
fn default_camera_timeout_secs() -> u64 {
    10
}
fn default_push_enabled() -> bool {
    true
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_commit_message() -> String {
    "New photo".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            device_path: default_device_path(),
            stats_interval_cycles: default_stats_interval_cycles(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: default_push_enabled(),
            repo_path: PathBuf::new(),
            remote: default_remote(),
            commit_message: default_commit_message(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ShakeCamConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default config file (config/default.toml)
    /// 2. Environment-specific config (config/{env}.toml)
    /// 3. Environment variables (prefixed with SHAKECAM_)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Override with environment variables (e.g., SHAKECAM_DETECTOR__THRESHOLD)
            .add_source(
                Environment::with_prefix("SHAKECAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("SHAKECAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    ///
    /// This is the only fatal error surface in the service: an invalid
    /// configuration refuses to start rather than run with undefined
    /// trigger semantics.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.detector.threshold.is_finite() || self.detector.threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "detector.threshold".to_string(),
                message: "threshold must be a finite value greater than 0".to_string(),
            });
        }

        // Filenames carry a second-resolution timestamp; a sub-second
        // cooldown could let two captures collide on the same name.
        if self.detector.cooldown_secs < 1 {
            return Err(ConfigValidationError::InvalidValue {
                field: "detector.cooldown_secs".to_string(),
                message: "cooldown must be at least 1 second".to_string(),
            });
        }

        if self.sampling.poll_interval_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "sampling.poll_interval_ms".to_string(),
                message: "poll interval must be greater than 0".to_string(),
            });
        }

        if self.capture.identity.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "capture.identity".to_string(),
            ));
        }
        if !self
            .capture
            .identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "capture.identity".to_string(),
                message: "identity may only contain [A-Za-z0-9_-]".to_string(),
            });
        }

        if self.capture.image_directory.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "capture.image_directory".to_string(),
            ));
        }

        if self.capture.command.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "capture.command".to_string(),
            ));
        }

        if self.push.enabled {
            if self.push.repo_path.as_os_str().is_empty() {
                return Err(ConfigValidationError::MissingField(
                    "push.repo_path".to_string(),
                ));
            }
            if !self.capture.image_directory.starts_with(&self.push.repo_path) {
                return Err(ConfigValidationError::InvalidValue {
                    field: "capture.image_directory".to_string(),
                    message: "image directory must be inside push.repo_path".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl DetectorConfig {
    /// Get cooldown as Duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl SamplingConfig {
    /// Get poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get settle delay as Duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl CaptureConfig {
    /// Get camera command timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
