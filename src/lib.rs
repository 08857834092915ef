//! Shakecam
//!
//! Shake-triggered photo capture controller for flat-sat camera payloads.
//! The service polls an accelerometer at a fixed interval, reduces each
//! 3-axis sample to a scalar shake signal, and fires a debounced trigger
//! when the signal exceeds a configured threshold. Each trigger pauses
//! sampling, captures a still photo with a deterministic filename, and
//! hands the image directory to a best-effort git push.
//!
//! # Architecture
//!
//! ```text
//! Accelerometer -> MagnitudePolicy -> ShakeDetector -> CaptureController
//!                                                        |        |
//!                                                   CameraSink  GitPusher
//! ```
//!
//! The poll loop is strictly sequential: no sample is evaluated while a
//! capture is in progress, and at most one push runs in the background.

pub mod camera;
pub mod config;
pub mod controller;
pub mod detector;
pub mod magnitude;
pub mod naming;
pub mod pusher;
pub mod sensor;

// Re-export main types
pub use camera::{CameraError, CameraSink, StillCommandCamera};
pub use config::{ConfigValidationError, ShakeCamConfig};
pub use controller::{CaptureController, CaptureError, CapturedImage, ControllerStats};
pub use detector::{CaptureEvent, ShakeDetector};
pub use magnitude::{MagnitudePolicy, STANDARD_GRAVITY};
pub use naming::image_path;
pub use pusher::{GitPusher, PersistencePusher, PushError};
pub use sensor::{Accelerometer, IioAccelerometer, MotionSample, SensorError};
