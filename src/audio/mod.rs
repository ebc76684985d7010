//! Microphone capture with calibrated voice-activity segmentation.
//!
//! Audio is captured via CPAL at the device's native rate, normalized to
//! 24 kHz mono f32, and segmented block by block: the first blocks of each
//! session calibrate a noise floor, then the listening loop gates, counts
//! silence, and stops once the caller has spoken and gone quiet.

/// Sample rate the downstream agent pipeline expects.
pub const TARGET_RATE: u32 = 24_000;

/// Mono everywhere past the device callback.
pub const TARGET_CHANNELS: u32 = 1;

/// Samples per segmentation block.
pub const BLOCK_SIZE: usize = 1024;

/// Fixed-point scale for the wire format. The downstream pipeline consumes
/// `(sample * 32767) as i16`; changing this breaks wire compatibility.
pub const PCM_SCALE: f32 = 32_767.0;

mod calibrate;
mod capture;
mod device;
mod dispatch;
mod meter;
mod resample;
mod segment;
#[cfg(test)]
mod tests;

pub use calibrate::{CalibrationProfile, NoiseCalibrator};
pub use capture::{capture_from_blocks, CaptureOutcome, Microphone};
pub use device::{list_input_devices, resolve_input_device};
pub use meter::LiveMeter;
pub use segment::{mean_abs_level, to_pcm16, BlockStatus, Segmenter, SegmenterConfig};
