//! Capture sequencing and the polling loop.
//!
//! One strictly sequential cycle: sample the accelerometer, reduce to a
//! shake signal, evaluate the detector, and on a trigger run the capture
//! sequence before the next sample is taken. No sample is evaluated while
//! a capture is in progress, so a shake during capture is missed rather
//! than queued. Only the git push leaves the cycle, as a fire-and-forget
//! background task with a single-flight guard.

use crate::camera::{CameraError, CameraSink};
use crate::config::ShakeCamConfig;
use crate::detector::{CaptureEvent, ShakeDetector};
use crate::magnitude::MagnitudePolicy;
use crate::naming;
use crate::pusher::PersistencePusher;
use crate::sensor::Accelerometer;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors that can occur during one capture sequence.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Camera failure: {0}")]
    Camera(#[from] CameraError),
}

/// A successfully captured image, handed to the pusher.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub identity: String,
    pub captured_at: DateTime<Utc>,
}

/// Counters accumulated by the polling loop.
#[derive(Debug, Default)]
pub struct ControllerStats {
    pub cycles: AtomicU64,
    pub sensor_errors: AtomicU64,
    pub captures: AtomicU64,
    pub camera_failures: AtomicU64,
    pub pushes_dispatched: AtomicU64,
    pub pushes_skipped: AtomicU64,
    pub push_failures: AtomicU64,
}

/// Shake-triggered capture controller.
///
/// Owns the detector state and the three collaborators; generic over
/// their traits so tests substitute fakes without hardware, filesystem,
/// or network.
pub struct CaptureController<A, C, P> {
    config: ShakeCamConfig,
    accelerometer: A,
    camera: C,
    pusher: Arc<P>,
    policy: MagnitudePolicy,
    detector: ShakeDetector,
    stats: Arc<ControllerStats>,
    push_task: Option<JoinHandle<()>>,
}

impl<A, C, P> CaptureController<A, C, P>
where
    A: Accelerometer,
    C: CameraSink,
    P: PersistencePusher + Send + Sync + 'static,
{
    pub fn new(config: ShakeCamConfig, accelerometer: A, camera: C, pusher: P) -> Self {
        let detector = ShakeDetector::new(config.detector.threshold, config.detector.cooldown());
        let policy = config.detector.magnitude_policy;

        Self {
            config,
            accelerometer,
            camera,
            pusher: Arc::new(pusher),
            policy,
            detector,
            stats: Arc::new(ControllerStats::default()),
            push_task: None,
        }
    }

    /// Get the shared loop statistics.
    pub fn stats(&self) -> Arc<ControllerStats> {
        self.stats.clone()
    }

    /// Run the polling loop until the process is terminated.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.config.capture.image_directory)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create image directory: {}", e))?;

        info!(
            identity = %self.config.capture.identity,
            threshold = self.config.detector.threshold,
            policy = ?self.policy,
            cooldown_secs = self.config.detector.cooldown_secs,
            poll_interval_ms = self.config.sampling.poll_interval_ms,
            "Waiting for shakes"
        );

        let mut interval = tokio::time::interval(self.config.sampling.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let stats_every = self.config.sampling.stats_interval_cycles;

        loop {
            interval.tick().await;
            self.step().await;

            let cycles = self.stats.cycles.load(Ordering::Relaxed);
            if stats_every > 0 && cycles % stats_every == 0 {
                self.log_stats();
            }
        }
    }

    /// Run one polling cycle: sample, estimate, detect, maybe capture.
    ///
    /// Exposed so tests can drive the state machine deterministically
    /// without real timing.
    pub async fn step(&mut self) {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let sample = match self.accelerometer.acceleration().await {
            Ok(sample) => sample,
            Err(e) => {
                // Transient: skip detection this cycle, retry next tick.
                self.stats.sensor_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Sensor read failed, skipping cycle");
                return;
            }
        };

        let signal = self.policy.estimate(&sample);

        let Some(event) = self.detector.evaluate(signal, Utc::now()) else {
            return;
        };

        info!(
            event_id = %event.event_id,
            magnitude = format!("{:.2}", event.magnitude),
            "Shake detected"
        );

        match self.handle_capture(&event).await {
            Ok(image) => {
                self.stats.captures.fetch_add(1, Ordering::Relaxed);
                info!(
                    event_id = %event.event_id,
                    path = %image.path.display(),
                    "Photo captured"
                );
                if self.config.push.enabled {
                    self.dispatch_push(&event);
                }
            }
            Err(e) => {
                self.stats.camera_failures.fetch_add(1, Ordering::Relaxed);
                warn!(event_id = %event.event_id, error = %e, "Capture failed");
            }
        }

        // Sampling resumes unconditionally after the settle delay, on
        // success and on camera failure alike.
        let settle = self.config.sampling.settle_delay();
        if !settle.is_zero() {
            debug!(settle_ms = settle.as_millis() as u64, "Settling after capture attempt");
            tokio::time::sleep(settle).await;
        }
    }

    /// Run the capture sequence for one accepted trigger.
    ///
    /// Names the image from the event's trigger time, invokes the camera,
    /// and returns the captured image for persistence. Persistence itself
    /// is not attempted here; a camera failure aborts the sequence before
    /// the pusher is ever involved.
    async fn handle_capture(&mut self, event: &CaptureEvent) -> Result<CapturedImage, CaptureError> {
        let path = naming::image_path(
            &self.config.capture.image_directory,
            &self.config.capture.identity,
            event.triggered_at,
        );

        debug!(event_id = %event.event_id, path = %path.display(), "Taking photo");
        self.camera.capture_to(&path).await?;

        Ok(CapturedImage {
            path,
            identity: self.config.capture.identity.clone(),
            captured_at: event.triggered_at,
        })
    }

    /// Hand the image directory to the pusher as a background task.
    ///
    /// At most one push is in flight: while the previous push is still
    /// running this one is skipped, not queued. The image is already on
    /// local disk, so a skipped or failed push never loses the photo.
    fn dispatch_push(&mut self, event: &CaptureEvent) {
        if let Some(task) = &self.push_task {
            if !task.is_finished() {
                self.stats.pushes_skipped.fetch_add(1, Ordering::Relaxed);
                debug!(event_id = %event.event_id, "Push already in flight, skipping");
                return;
            }
        }

        let pusher = self.pusher.clone();
        let stats = self.stats.clone();
        let image_dir = self.config.capture.image_directory.clone();
        let event_id = event.event_id;

        stats.pushes_dispatched.fetch_add(1, Ordering::Relaxed);
        self.push_task = Some(tokio::spawn(async move {
            match pusher.push(&image_dir).await {
                Ok(()) => info!(event_id = %event_id, "Pushed new photo to remote"),
                Err(e) => {
                    // Best-effort: the photo exists locally, nothing to retry.
                    stats.push_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(event_id = %event_id, error = %e, "Push failed");
                }
            }
        }));
    }

    fn log_stats(&self) {
        info!(
            cycles = self.stats.cycles.load(Ordering::Relaxed),
            sensor_errors = self.stats.sensor_errors.load(Ordering::Relaxed),
            captures = self.stats.captures.load(Ordering::Relaxed),
            camera_failures = self.stats.camera_failures.load(Ordering::Relaxed),
            pushes_dispatched = self.stats.pushes_dispatched.load(Ordering::Relaxed),
            pushes_skipped = self.stats.pushes_skipped.load(Ordering::Relaxed),
            push_failures = self.stats.push_failures.load(Ordering::Relaxed),
            "Loop stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraError;
    use crate::config::{
        CaptureConfig, DetectorConfig, LoggingConfig, PushConfig, SamplingConfig,
    };
    use crate::pusher::PushError;
    use crate::sensor::{MotionSample, SensorError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    struct ScriptedAccelerometer {
        readings: VecDeque<Result<MotionSample, SensorError>>,
    }

    impl ScriptedAccelerometer {
        fn new(readings: Vec<Result<MotionSample, SensorError>>) -> Self {
            Self {
                readings: readings.into(),
            }
        }

        fn still() -> Result<MotionSample, SensorError> {
            Ok(MotionSample { x: 0.0, y: 0.0, z: 0.0 })
        }

        fn shake() -> Result<MotionSample, SensorError> {
            Ok(MotionSample { x: 20.0, y: 0.0, z: 0.0 })
        }

        fn error() -> Result<MotionSample, SensorError> {
            Err(SensorError::Parse {
                path: PathBuf::from("/sys/fake/in_accel_x_raw"),
                value: "???".to_string(),
            })
        }
    }

    #[async_trait]
    impl Accelerometer for ScriptedAccelerometer {
        async fn acceleration(&mut self) -> Result<MotionSample, SensorError> {
            self.readings
                .pop_front()
                .unwrap_or_else(ScriptedAccelerometer::still)
        }
    }

    struct FakeCamera {
        fail: bool,
        captured: Mutex<Vec<PathBuf>>,
    }

    impl FakeCamera {
        fn working() -> Self {
            Self {
                fail: false,
                captured: Mutex::new(Vec::new()),
            }
        }

        fn broken() -> Self {
            Self {
                fail: true,
                captured: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CameraSink for FakeCamera {
        async fn capture_to(&self, path: &Path) -> Result<(), CameraError> {
            if self.fail {
                return Err(CameraError::Timeout(std::time::Duration::from_secs(10)));
            }
            std::fs::write(path, b"jpeg").unwrap();
            self.captured.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePusher {
        fail: bool,
        pushed: Mutex<Vec<PathBuf>>,
    }

    /// Pusher that holds its push open until released, for exercising
    /// the single-flight guard.
    struct BlockingPusher {
        release: Arc<tokio::sync::Notify>,
        pushed: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PersistencePusher for BlockingPusher {
        async fn push(&self, image_dir: &Path) -> Result<(), PushError> {
            self.release.notified().await;
            self.pushed.lock().unwrap().push(image_dir.to_path_buf());
            Ok(())
        }
    }

    #[async_trait]
    impl PersistencePusher for FakePusher {
        async fn push(&self, image_dir: &Path) -> Result<(), PushError> {
            self.pushed.lock().unwrap().push(image_dir.to_path_buf());
            if self.fail {
                use std::os::unix::process::ExitStatusExt;
                return Err(PushError::GitFailed {
                    step: "push",
                    status: std::process::ExitStatus::from_raw(256),
                    stderr: "remote unreachable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn test_config(image_dir: &Path) -> ShakeCamConfig {
        ShakeCamConfig {
            detector: DetectorConfig {
                threshold: 15.0,
                magnitude_policy: MagnitudePolicy::RawNorm,
                cooldown_secs: 5,
            },
            sampling: SamplingConfig {
                poll_interval_ms: 100,
                settle_delay_ms: 0,
                device_path: PathBuf::from("/sys/fake"),
                stats_interval_cycles: 0,
            },
            capture: CaptureConfig {
                identity: "TahmidI".to_string(),
                image_directory: image_dir.to_path_buf(),
                command: "true".to_string(),
                extra_args: vec![],
                timeout_secs: 10,
            },
            push: PushConfig {
                enabled: true,
                repo_path: image_dir.to_path_buf(),
                remote: "origin".to_string(),
                commit_message: "New photo".to_string(),
            },
            logging: LoggingConfig::default(),
        }
    }

    async fn finish_push<A, C, P>(controller: &mut CaptureController<A, C, P>) {
        if let Some(task) = controller.push_task.take() {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn shake_produces_capture_and_push() {
        let dir = tempfile::tempdir().unwrap();
        let accel = ScriptedAccelerometer::new(vec![
            ScriptedAccelerometer::still(),
            ScriptedAccelerometer::shake(),
        ]);

        let mut controller = CaptureController::new(
            test_config(dir.path()),
            accel,
            FakeCamera::working(),
            FakePusher::default(),
        );

        controller.step().await;
        controller.step().await;
        finish_push(&mut controller).await;

        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 1);
        assert_eq!(controller.stats.pushes_dispatched.load(Ordering::Relaxed), 1);
        assert_eq!(controller.stats.push_failures.load(Ordering::Relaxed), 0);
        assert_eq!(controller.pusher.pushed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn captured_path_matches_naming() {
        // The path the camera writes must be exactly what image naming
        // produces for the event's identity and trigger time.
        let dir = tempfile::tempdir().unwrap();
        let accel = ScriptedAccelerometer::new(vec![ScriptedAccelerometer::shake()]);

        let mut controller = CaptureController::new(
            test_config(dir.path()),
            accel,
            FakeCamera::working(),
            FakePusher::default(),
        );

        controller.step().await;
        finish_push(&mut controller).await;

        let captured = controller.camera.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let name = captured[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("TahmidI_"));
        assert!(name.ends_with(".jpg"));
        assert!(captured[0].exists());
    }

    #[tokio::test]
    async fn camera_failure_skips_push_and_loop_continues() {
        // Scenario: camera reports failure. No image, no push, and the
        // loop keeps sampling afterwards.
        let dir = tempfile::tempdir().unwrap();
        let accel = ScriptedAccelerometer::new(vec![
            ScriptedAccelerometer::shake(),
            ScriptedAccelerometer::still(),
        ]);

        let mut controller = CaptureController::new(
            test_config(dir.path()),
            accel,
            FakeCamera::broken(),
            FakePusher::default(),
        );

        controller.step().await;
        assert_eq!(controller.stats.camera_failures.load(Ordering::Relaxed), 1);
        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 0);
        assert!(controller.pusher.pushed.lock().unwrap().is_empty());
        assert!(controller.push_task.is_none());

        controller.step().await;
        assert_eq!(controller.stats.cycles.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn push_failure_leaves_capture_successful() {
        // Scenario: push fails after a successful capture. The image
        // exists locally and the capture still counts.
        let dir = tempfile::tempdir().unwrap();
        let accel = ScriptedAccelerometer::new(vec![ScriptedAccelerometer::shake()]);

        let mut controller = CaptureController::new(
            test_config(dir.path()),
            accel,
            FakeCamera::working(),
            FakePusher {
                fail: true,
                ..FakePusher::default()
            },
        );

        controller.step().await;
        finish_push(&mut controller).await;

        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 1);
        assert_eq!(controller.stats.push_failures.load(Ordering::Relaxed), 1);
        let captured = controller.camera.captured.lock().unwrap();
        assert!(captured[0].exists());
    }

    #[tokio::test]
    async fn sensor_error_skips_cycle_without_detection() {
        let dir = tempfile::tempdir().unwrap();
        let accel = ScriptedAccelerometer::new(vec![
            ScriptedAccelerometer::error(),
            ScriptedAccelerometer::shake(),
        ]);

        let mut controller = CaptureController::new(
            test_config(dir.path()),
            accel,
            FakeCamera::working(),
            FakePusher::default(),
        );

        controller.step().await;
        assert_eq!(controller.stats.sensor_errors.load(Ordering::Relaxed), 1);
        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 0);

        // The loop recovers on the next cycle.
        controller.step().await;
        finish_push(&mut controller).await;
        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn sustained_shake_fires_once_per_cooldown() {
        // Every cycle reads above threshold; the detector cooldown still
        // admits only the first trigger.
        let dir = tempfile::tempdir().unwrap();
        let accel = ScriptedAccelerometer::new(vec![
            ScriptedAccelerometer::shake(),
            ScriptedAccelerometer::shake(),
            ScriptedAccelerometer::shake(),
        ]);

        let mut controller = CaptureController::new(
            test_config(dir.path()),
            accel,
            FakeCamera::working(),
            FakePusher::default(),
        );

        controller.step().await;
        controller.step().await;
        controller.step().await;
        finish_push(&mut controller).await;

        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn second_push_skipped_while_first_in_flight() {
        // At most one push may be in flight: a capture landing while the
        // previous push is still running skips its push, not queues it.
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        // Zero cooldown so back-to-back cycles can both trigger; the
        // single-flight guard, not the detector, is under test here.
        config.detector.cooldown_secs = 0;

        let release = Arc::new(tokio::sync::Notify::new());
        let accel = ScriptedAccelerometer::new(vec![
            ScriptedAccelerometer::shake(),
            ScriptedAccelerometer::shake(),
        ]);

        let mut controller = CaptureController::new(
            config,
            accel,
            FakeCamera::working(),
            BlockingPusher {
                release: release.clone(),
                pushed: Mutex::new(Vec::new()),
            },
        );

        controller.step().await;
        assert_eq!(controller.stats.pushes_dispatched.load(Ordering::Relaxed), 1);

        controller.step().await;
        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 2);
        assert_eq!(controller.stats.pushes_skipped.load(Ordering::Relaxed), 1);
        // Still only the first push was ever spawned.
        assert_eq!(controller.stats.pushes_dispatched.load(Ordering::Relaxed), 1);

        release.notify_one();
        finish_push(&mut controller).await;
        assert_eq!(controller.pusher.pushed.lock().unwrap().len(), 1);
        assert_eq!(controller.stats.push_failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn push_slot_frees_after_completion() {
        // Once the in-flight push finishes, the next capture dispatches
        // a fresh push instead of skipping.
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.detector.cooldown_secs = 0;

        let accel = ScriptedAccelerometer::new(vec![
            ScriptedAccelerometer::shake(),
            ScriptedAccelerometer::shake(),
        ]);

        let mut controller = CaptureController::new(
            config,
            accel,
            FakeCamera::working(),
            FakePusher::default(),
        );

        controller.step().await;
        finish_push(&mut controller).await;
        controller.step().await;
        finish_push(&mut controller).await;

        assert_eq!(controller.stats.pushes_dispatched.load(Ordering::Relaxed), 2);
        assert_eq!(controller.stats.pushes_skipped.load(Ordering::Relaxed), 0);
        assert_eq!(controller.pusher.pushed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn push_disabled_captures_without_pushing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.push.enabled = false;

        let accel = ScriptedAccelerometer::new(vec![ScriptedAccelerometer::shake()]);
        let mut controller =
            CaptureController::new(config, accel, FakeCamera::working(), FakePusher::default());

        controller.step().await;

        assert_eq!(controller.stats.captures.load(Ordering::Relaxed), 1);
        assert!(controller.push_task.is_none());
        assert!(controller.pusher.pushed.lock().unwrap().is_empty());
    }
}
