//! Voice-activity segmentation state machine.
//!
//! Decides, one block at a time, whether to keep accumulating audio and when
//! an utterance has ended. The machine has three phases: calibrating (first
//! blocks feed the noise-floor estimate, nothing is buffered), listening
//! (noise gate + silence counting), and done.

use super::calibrate::{CalibrationProfile, NoiseCalibrator};
use super::{BLOCK_SIZE, PCM_SCALE, TARGET_RATE};
use crate::config::CaptureConfig;

/// Tunables for one segmentation session.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Trailing silence that ends an utterance.
    pub silence_tail_ms: u64,
    /// Blocks observed before thresholds are derived.
    pub calibration_blocks: usize,
    /// Hard cap on session length, counted in blocks.
    pub max_capture_ms: u64,
    pub silence_threshold: f32,
    pub speech_threshold: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_RATE,
            block_size: BLOCK_SIZE,
            silence_tail_ms: 1_000,
            calibration_blocks: 10,
            max_capture_ms: 30_000,
            silence_threshold: super::calibrate::DEFAULT_SILENCE_THRESHOLD,
            speech_threshold: super::calibrate::DEFAULT_SPEECH_THRESHOLD,
        }
    }
}

impl From<&CaptureConfig> for SegmenterConfig {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            block_size: cfg.block_size,
            silence_tail_ms: cfg.silence_tail_ms,
            calibration_blocks: cfg.calibration_blocks,
            max_capture_ms: cfg.max_capture_ms,
            silence_threshold: cfg.silence_threshold,
            speech_threshold: cfg.speech_threshold,
        }
    }
}

impl SegmenterConfig {
    /// Consecutive quiet blocks required after speech before stopping.
    pub fn blocks_per_silence(&self) -> usize {
        let blocks = (self.sample_rate as f64 * self.silence_tail_ms as f64 / 1000.0)
            / self.block_size as f64;
        (blocks.round() as usize).max(1)
    }

    /// Total block budget before the session gives up.
    pub fn max_iterations(&self) -> usize {
        let blocks = (self.sample_rate as f64 * self.max_capture_ms as f64 / 1000.0)
            / self.block_size as f64;
        (blocks.round() as usize).max(1)
    }
}

/// Verdict after feeding one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Keep reading.
    Continue,
    /// Speech was heard and the silence tail is complete.
    SilenceAfterSpeech,
    /// Block budget exhausted.
    TimedOut,
}

/// What the session produced once it stopped.
#[derive(Debug, PartialEq)]
pub(super) enum SegmentResult {
    /// Timed out without the speech threshold ever being crossed.
    NoSpeech,
    /// Speech was detected but gating removed every sample.
    Empty,
    /// Accumulated buffer, zero-filled gaps included.
    Samples(Vec<f32>),
}

pub struct Segmenter {
    calibrator: NoiseCalibrator,
    profile: Option<CalibrationProfile>,
    buffer: Vec<f32>,
    silence_blocks: usize,
    has_speech: bool,
    iterations: usize,
    blocks_per_silence: usize,
    max_iterations: usize,
}

impl Segmenter {
    pub fn new(cfg: &SegmenterConfig) -> Self {
        Self {
            calibrator: NoiseCalibrator::new(
                cfg.calibration_blocks,
                cfg.silence_threshold,
                cfg.speech_threshold,
            ),
            profile: None,
            buffer: Vec::new(),
            silence_blocks: 0,
            has_speech: false,
            iterations: 0,
            blocks_per_silence: cfg.blocks_per_silence(),
            max_iterations: cfg.max_iterations(),
        }
    }

    /// Feed one block of mono samples in [-1, 1].
    pub fn push_block(&mut self, block: &[f32]) -> BlockStatus {
        self.iterations += 1;
        let level = mean_abs_level(block);

        match self.profile {
            None => {
                // Calibration blocks are observed, never buffered.
                if let Some(profile) = self.calibrator.observe(level) {
                    self.profile = Some(profile);
                }
            }
            Some(profile) => {
                if level > profile.noise_floor {
                    self.buffer.extend_from_slice(block);
                } else {
                    // Zero-fill so downstream timing stays aligned.
                    let len = self.buffer.len();
                    self.buffer.resize(len + block.len(), 0.0);
                }

                if level < profile.silence_threshold {
                    self.silence_blocks += 1;
                } else {
                    self.silence_blocks = 0;
                    if level > profile.speech_threshold {
                        self.has_speech = true;
                    }
                }

                if self.has_speech && self.silence_blocks >= self.blocks_per_silence {
                    return BlockStatus::SilenceAfterSpeech;
                }
            }
        }

        if self.iterations >= self.max_iterations {
            BlockStatus::TimedOut
        } else {
            BlockStatus::Continue
        }
    }

    pub fn has_speech(&self) -> bool {
        self.has_speech
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    pub(super) fn into_result(self) -> SegmentResult {
        if !self.has_speech {
            SegmentResult::NoSpeech
        } else if self.buffer.is_empty() {
            SegmentResult::Empty
        } else {
            SegmentResult::Samples(self.buffer)
        }
    }
}

/// Mean absolute amplitude of a block; the level every threshold compares
/// against.
pub fn mean_abs_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}

/// Convert a float buffer to the fixed-point wire format.
///
/// Truncating cast. Downstream consumers expect these exact values; do not
/// switch to rounding without coordinating with them.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|s| (s * PCM_SCALE) as i16).collect()
}
