//! Default values shared between CLI flags and the capture config.

pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_BLOCK_SIZE: usize = 1_024;
pub const DEFAULT_SILENCE_TAIL_MS: u64 = 1_000;
pub const DEFAULT_CALIBRATION_BLOCKS: usize = 10;
pub const DEFAULT_MAX_CAPTURE_MS: u64 = 30_000;
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;
pub const DEFAULT_SPEECH_THRESHOLD: f32 = 0.02;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
/// Mean |i16| below this is treated as an empty pickup, not an utterance.
pub const DEFAULT_MIN_UTTERANCE_LEVEL: f32 = 5.0;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_STOP_GRACE_MS: u64 = 500;
pub const DEFAULT_ECHO_CHUNK_MS: u64 = 200;

pub const MAX_CAPTURE_HARD_LIMIT_MS: u64 = 300_000;
pub const MIN_SILENCE_TAIL_MS: u64 = 200;
