//! Debounced threshold trigger over the shake signal.
//!
//! Conceptually a two-state machine (idle / cooling down), collapsed into
//! a single guard expression: the cooldown state is just "time since the
//! last accepted trigger has not yet exceeded the cooldown". One gate
//! suppresses both repeated firing on a single physical shake, which spans
//! many polling cycles above threshold, and rapid-fire triggering on
//! sustained vibration.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// A single accepted shake trigger.
///
/// Consumed immediately by the capture sequencer and then discarded; the
/// strictly sequential poll loop guarantees at most one event exists at a
/// time.
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    /// Correlation id carried through capture and push logs
    pub event_id: Uuid,

    /// When the triggering sample was evaluated
    pub triggered_at: DateTime<Utc>,

    /// The shake signal that exceeded the threshold
    pub magnitude: f64,
}

/// Debounced shake detector.
///
/// Owns the only mutable detection state in the service; mutated solely
/// on an accepted trigger. Cannot fail: pure arithmetic over validated
/// inputs.
#[derive(Debug)]
pub struct ShakeDetector {
    threshold: f64,
    cooldown: Duration,
    last_trigger: Option<DateTime<Utc>>,
}

impl ShakeDetector {
    /// Create a detector.
    ///
    /// `threshold` and `cooldown` come from validated configuration;
    /// a cooldown shorter than the poll interval degrades to firing on
    /// every above-threshold sample.
    pub fn new(threshold: f64, cooldown: std::time::Duration) -> Self {
        Self {
            threshold,
            cooldown: Duration::from_std(cooldown).unwrap_or(Duration::MAX),
            last_trigger: None,
        }
    }

    /// Whether the detector is still suppressing triggers at `now`.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_trigger {
            Some(last) => now.signed_duration_since(last) <= self.cooldown,
            None => false,
        }
    }

    /// Evaluate one shake signal.
    ///
    /// Fires iff the signal strictly exceeds the threshold and the
    /// cooldown window since the last accepted trigger has fully elapsed.
    /// A boundary-exact signal does not trigger.
    pub fn evaluate(&mut self, signal: f64, now: DateTime<Utc>) -> Option<CaptureEvent> {
        if signal > self.threshold && !self.in_cooldown(now) {
            self.last_trigger = Some(now);

            return Some(CaptureEvent {
                event_id: Uuid::new_v4(),
                triggered_at: now,
                magnitude: signal,
            });
        }

        None
    }
}
