//! Reduction of a 3-axis acceleration sample to the scalar shake signal.
//!
//! The policy is an explicit configuration choice because it changes what
//! the detector threshold means: a resting sensor reads ~9.8 m/s² under
//! `raw_norm` but ~0 under `gravity_deviation`. Pairing a raw-norm
//! threshold with a gravity-inclusive sensor (or the reverse) yields
//! either near-permanent triggering or near-total insensitivity.

use crate::sensor::MotionSample;
use serde::Deserialize;

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// How a [`MotionSample`] is reduced to the scalar compared against the
/// detector threshold.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudePolicy {
    /// Euclidean norm of the sample. Appropriate when the sensor's rest
    /// output is near zero.
    RawNorm,

    /// Absolute deviation of the norm from standard gravity. Appropriate
    /// when the sensor reports gravity-inclusive readings, so only the
    /// excess motion is judged against the threshold.
    GravityDeviation,
}

impl MagnitudePolicy {
    /// Reduce a sample to its shake signal.
    ///
    /// Pure and total: any finite input yields a finite non-negative output.
    pub fn estimate(&self, sample: &MotionSample) -> f64 {
        let norm = (sample.x * sample.x + sample.y * sample.y + sample.z * sample.z).sqrt();

        match self {
            MagnitudePolicy::RawNorm => norm,
            MagnitudePolicy::GravityDeviation => (norm - STANDARD_GRAVITY).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64, z: f64) -> MotionSample {
        MotionSample { x, y, z }
    }

    #[test]
    fn raw_norm_is_euclidean() {
        let signal = MagnitudePolicy::RawNorm.estimate(&sample(3.0, 4.0, 0.0));
        assert!((signal - 5.0).abs() < 1e-12);
    }

    #[test]
    fn raw_norm_of_zero_vector_is_zero() {
        let signal = MagnitudePolicy::RawNorm.estimate(&sample(0.0, 0.0, 0.0));
        assert_eq!(signal, 0.0);
    }

    #[test]
    fn gravity_deviation_at_rest_is_near_zero() {
        // Sensor at rest reports gravity on one axis.
        let signal =
            MagnitudePolicy::GravityDeviation.estimate(&sample(0.0, 0.0, STANDARD_GRAVITY));
        assert!(signal < 1e-9);
    }

    #[test]
    fn gravity_deviation_is_non_negative_below_gravity() {
        // Free-fall: norm well below g must still give a positive signal.
        let signal = MagnitudePolicy::GravityDeviation.estimate(&sample(0.0, 0.0, 1.0));
        assert!((signal - (STANDARD_GRAVITY - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn gravity_deviation_of_strong_shake() {
        // Norm 15.0 gives a deviation of roughly 5.2, well over a 3.0 threshold.
        let signal = MagnitudePolicy::GravityDeviation.estimate(&sample(0.0, 0.0, 15.0));
        assert!((signal - (15.0 - STANDARD_GRAVITY)).abs() < 1e-9);
        assert!(signal > 3.0);
    }

    #[test]
    fn policy_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            policy: MagnitudePolicy,
        }

        let raw: Holder = serde_json::from_str(r#"{"policy":"raw_norm"}"#).unwrap();
        assert_eq!(raw.policy, MagnitudePolicy::RawNorm);

        let dev: Holder = serde_json::from_str(r#"{"policy":"gravity_deviation"}"#).unwrap();
        assert_eq!(dev.policy, MagnitudePolicy::GravityDeviation);

        assert!(serde_json::from_str::<Holder>(r#"{"policy":"norm"}"#).is_err());
    }
}
