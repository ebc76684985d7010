//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::Parser;

pub use defaults::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CALIBRATION_BLOCKS, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_ECHO_CHUNK_MS, DEFAULT_MAX_CAPTURE_MS, DEFAULT_MIN_UTTERANCE_LEVEL,
    DEFAULT_RETRY_BACKOFF_MS, DEFAULT_SAMPLE_RATE, DEFAULT_SILENCE_TAIL_MS,
    DEFAULT_SILENCE_THRESHOLD, DEFAULT_SPEECH_THRESHOLD, DEFAULT_STOP_GRACE_MS,
};
use defaults::{MAX_CAPTURE_HARD_LIMIT_MS, MIN_SILENCE_TAIL_MS};

/// CLI options for the voice assistant. Validated values keep the capture
/// loop and playback path inside sane bounds.
#[derive(Debug, Parser, Clone)]
#[command(about = "Voice-driven support assistant", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VOICEDESK_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VOICEDESK_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "VOICEDESK_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,

    /// Target sample rate for the capture pipeline (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Samples per segmentation block
    #[arg(long = "block-size", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Trailing silence required before stopping capture (milliseconds)
    #[arg(long = "silence-tail-ms", default_value_t = DEFAULT_SILENCE_TAIL_MS)]
    pub silence_tail_ms: u64,

    /// Blocks sampled for noise-floor calibration at the start of a capture
    #[arg(long = "calibration-blocks", default_value_t = DEFAULT_CALIBRATION_BLOCKS)]
    pub calibration_blocks: usize,

    /// Maximum capture duration before a hard stop (milliseconds)
    #[arg(long = "max-capture-ms", default_value_t = DEFAULT_MAX_CAPTURE_MS)]
    pub max_capture_ms: u64,

    /// Floor for the derived silence threshold (linear amplitude)
    #[arg(long = "silence-threshold", default_value_t = DEFAULT_SILENCE_THRESHOLD)]
    pub silence_threshold: f32,

    /// Floor for the derived speech threshold (linear amplitude)
    #[arg(long = "speech-threshold", default_value_t = DEFAULT_SPEECH_THRESHOLD)]
    pub speech_threshold: f32,

    /// Block channel capacity between the audio callback and the capture loop
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Minimum mean amplitude (i16 units) for an utterance to count
    #[arg(long = "min-utterance-level", default_value_t = DEFAULT_MIN_UTTERANCE_LEVEL)]
    pub min_utterance_level: f32,

    /// Pause between retries after a turn produced nothing (milliseconds)
    #[arg(long = "retry-backoff-ms", default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    pub retry_backoff_ms: u64,

    /// Grace period between a stop request and joining the worker (milliseconds)
    #[arg(long = "stop-grace-ms", default_value_t = DEFAULT_STOP_GRACE_MS)]
    pub stop_grace_ms: u64,

    /// Echo pipeline chunk size (milliseconds of audio per response chunk)
    #[arg(long = "echo-chunk-ms", default_value_t = DEFAULT_ECHO_CHUNK_MS)]
    pub echo_chunk_ms: u64,
}

/// Tunable parameters for the capture and conversation loop, snapshotted
/// from the CLI so the worker thread never touches `AppConfig` directly.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub silence_tail_ms: u64,
    pub calibration_blocks: usize,
    pub max_capture_ms: u64,
    pub silence_threshold: f32,
    pub speech_threshold: f32,
    pub channel_capacity: usize,
    pub min_utterance_level: f32,
    pub retry_backoff_ms: u64,
    pub stop_grace_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            silence_tail_ms: DEFAULT_SILENCE_TAIL_MS,
            calibration_blocks: DEFAULT_CALIBRATION_BLOCKS,
            max_capture_ms: DEFAULT_MAX_CAPTURE_MS,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            speech_threshold: DEFAULT_SPEECH_THRESHOLD,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            min_utterance_level: DEFAULT_MIN_UTTERANCE_LEVEL,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
        }
    }
}

impl CaptureConfig {
    /// Samples per echo-pipeline chunk at the configured rate.
    pub fn chunk_samples(&self, chunk_ms: u64) -> usize {
        ((u64::from(self.sample_rate) * chunk_ms) / 1_000).max(1) as usize
    }
}
