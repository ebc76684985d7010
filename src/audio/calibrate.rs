//! Per-session noise-floor calibration.
//!
//! A single static silence threshold misfires in variable-noise rooms, so
//! every capture session measures its own ambient level first and derives two
//! thresholds from it: a looser one for "is this silence" and a stricter one
//! for "is this genuinely speech".

use crate::log_debug;

/// Floor applied to the derived silence threshold.
pub(super) const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;
/// Floor applied to the derived speech threshold.
pub(super) const DEFAULT_SPEECH_THRESHOLD: f32 = 0.02;

const NOISE_FLOOR_MARGIN: f32 = 1.5;
const SILENCE_OVER_FLOOR: f32 = 1.2;
const SPEECH_OVER_FLOOR: f32 = 2.5;

/// Thresholds derived from the first blocks of a capture session.
///
/// Immutable once computed; a session never re-calibrates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    /// Ambient level estimate; blocks at or below it are zero-filled.
    pub noise_floor: f32,
    /// Levels below this count toward the end-of-utterance silence run.
    pub silence_threshold: f32,
    /// Levels above this latch `has_speech`.
    pub speech_threshold: f32,
}

impl CalibrationProfile {
    /// Derive a profile from observed block levels.
    pub fn from_levels(levels: &[f32], silence_default: f32, speech_default: f32) -> Self {
        let mean = if levels.is_empty() {
            0.0
        } else {
            levels.iter().sum::<f32>() / levels.len() as f32
        };
        let noise_floor = mean * NOISE_FLOOR_MARGIN;
        Self {
            noise_floor,
            silence_threshold: silence_default.max(noise_floor * SILENCE_OVER_FLOOR),
            speech_threshold: speech_default.max(noise_floor * SPEECH_OVER_FLOOR),
        }
    }
}

/// Collects block levels until enough have been seen to build a profile.
pub struct NoiseCalibrator {
    levels: Vec<f32>,
    blocks_needed: usize,
    silence_default: f32,
    speech_default: f32,
}

impl NoiseCalibrator {
    pub fn new(blocks_needed: usize, silence_default: f32, speech_default: f32) -> Self {
        Self {
            levels: Vec::with_capacity(blocks_needed),
            blocks_needed: blocks_needed.max(1),
            silence_default,
            speech_default,
        }
    }

    /// Record one block level. Returns the finished profile on the final
    /// calibration block, `None` while still collecting.
    pub fn observe(&mut self, level: f32) -> Option<CalibrationProfile> {
        self.levels.push(level);
        if self.levels.len() < self.blocks_needed {
            return None;
        }
        let profile = CalibrationProfile::from_levels(
            &self.levels,
            self.silence_default,
            self.speech_default,
        );
        log_debug(&format!(
            "calibrated noise floor {:.6} (silence {:.6}, speech {:.6})",
            profile.noise_floor, profile.silence_threshold, profile.speech_threshold
        ));
        Some(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_room_falls_back_to_default_thresholds() {
        let profile = CalibrationProfile::from_levels(
            &[0.001; 10],
            DEFAULT_SILENCE_THRESHOLD,
            DEFAULT_SPEECH_THRESHOLD,
        );
        assert!((profile.noise_floor - 0.0015).abs() < 1e-7);
        assert_eq!(profile.silence_threshold, 0.01);
        assert_eq!(profile.speech_threshold, 0.02);
    }

    #[test]
    fn noisy_room_scales_thresholds_above_defaults() {
        let profile = CalibrationProfile::from_levels(
            &[0.02; 10],
            DEFAULT_SILENCE_THRESHOLD,
            DEFAULT_SPEECH_THRESHOLD,
        );
        assert!((profile.noise_floor - 0.03).abs() < 1e-7);
        assert!((profile.silence_threshold - 0.036).abs() < 1e-7);
        assert!((profile.speech_threshold - 0.075).abs() < 1e-7);
    }

    #[test]
    fn observe_yields_profile_on_final_block() {
        let mut calibrator =
            NoiseCalibrator::new(3, DEFAULT_SILENCE_THRESHOLD, DEFAULT_SPEECH_THRESHOLD);
        assert!(calibrator.observe(0.001).is_none());
        assert!(calibrator.observe(0.002).is_none());
        let profile = calibrator.observe(0.003).expect("third block completes calibration");
        assert!((profile.noise_floor - 0.003).abs() < 1e-7);
    }
}
