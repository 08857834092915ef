//! Camera access.
//!
//! The capture sequencer only sees the [`CameraSink`] trait; the
//! production implementation shells out to a still-capture command such
//! as `libcamera-still`, which keeps the camera pipeline configuration
//! out of this service entirely.

use crate::config::CaptureConfig;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors that can occur while capturing a still frame.
///
/// All camera errors are non-fatal: the capture attempt is aborted,
/// persistence is skipped, and sampling resumes.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Failed to launch capture command {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture command exited with {status}: {stderr}")]
    CaptureFailed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Capture command timed out after {0:?}")]
    Timeout(Duration),
}

/// Sink that writes one still frame to a path.
#[async_trait]
pub trait CameraSink {
    /// Capture a still frame to `path`.
    async fn capture_to(&self, path: &Path) -> Result<(), CameraError>;
}

/// Camera backed by an external still-capture command.
pub struct StillCommandCamera {
    command: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl StillCommandCamera {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            command: config.command.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl CameraSink for StillCommandCamera {
    async fn capture_to(&self, path: &Path) -> Result<(), CameraError> {
        debug!(command = %self.command, path = %path.display(), "Invoking capture command");

        let output = Command::new(&self.command)
            .args(&self.extra_args)
            .arg("-o")
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| CameraError::Timeout(self.timeout))?
            .map_err(|source| CameraError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CameraError::CaptureFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
