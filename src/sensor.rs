//! Accelerometer access.
//!
//! The rest of the service only sees the [`Accelerometer`] trait; the
//! production implementation reads a Linux IIO sysfs device so the poll
//! loop needs no direct hardware bindings.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One instantaneous 3-axis acceleration reading in m/s².
///
/// Produced and consumed within a single polling cycle, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Errors that can occur while reading the accelerometer.
///
/// All sensor errors are transient: the polling cycle that hits one is
/// skipped and the loop retries on the next tick.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to read sensor file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unparseable sensor value in {path}: {value:?}")]
    Parse { path: PathBuf, value: String },
}

/// Source of acceleration samples.
#[async_trait]
pub trait Accelerometer {
    /// Read one acceleration sample.
    async fn acceleration(&mut self) -> Result<MotionSample, SensorError>;
}

/// Accelerometer backed by a Linux IIO sysfs device directory.
///
/// Expects the usual `in_accel_{x,y,z}_raw` attribute files plus an
/// `in_accel_scale` factor converting raw counts to m/s².
pub struct IioAccelerometer {
    device_path: PathBuf,
    scale: f64,
}

impl IioAccelerometer {
    /// Open the device and read its scale factor once.
    pub async fn open(device_path: impl Into<PathBuf>) -> Result<Self, SensorError> {
        let device_path = device_path.into();
        let scale = read_value(&device_path.join("in_accel_scale")).await?;

        Ok(Self { device_path, scale })
    }

    async fn read_axis(&self, axis: &str) -> Result<f64, SensorError> {
        let path = self.device_path.join(format!("in_accel_{}_raw", axis));
        let raw = read_value(&path).await?;
        Ok(raw * self.scale)
    }
}

#[async_trait]
impl Accelerometer for IioAccelerometer {
    async fn acceleration(&mut self) -> Result<MotionSample, SensorError> {
        let x = self.read_axis("x").await?;
        let y = self.read_axis("y").await?;
        let z = self.read_axis("z").await?;

        Ok(MotionSample { x, y, z })
    }
}

/// Read and parse one numeric sysfs attribute.
async fn read_value(path: &Path) -> Result<f64, SensorError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SensorError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    contents
        .trim()
        .parse::<f64>()
        .map_err(|_| SensorError::Parse {
            path: path.to_path_buf(),
            value: contents.trim().to_string(),
        })
}
