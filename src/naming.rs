//! Deterministic image filename construction.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Build the path an image captured at `at` is written to.
///
/// Format: `{dir}/{identity}_{HHMMSS}.jpg`. Pure and deterministic; the
/// second-resolution suffix cannot collide because the detector cooldown
/// is validated to be at least one second.
pub fn image_path(dir: &Path, identity: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}_{}.jpg", identity, at.format("%H%M%S")))
}
