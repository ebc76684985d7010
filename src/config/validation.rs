use super::{AppConfig, CaptureConfig, MAX_CAPTURE_HARD_LIMIT_MS, MIN_SILENCE_TAIL_MS};
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before anything touches an audio device.
    pub fn validate(&mut self) -> Result<()> {
        if !(8_000..=96_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 96000 Hz, got {}",
                self.sample_rate
            );
        }
        if !(128..=8_192).contains(&self.block_size) {
            bail!(
                "--block-size must be between 128 and 8192 samples, got {}",
                self.block_size
            );
        }
        if self.max_capture_ms == 0 || self.max_capture_ms > MAX_CAPTURE_HARD_LIMIT_MS {
            bail!(
                "--max-capture-ms must be between 1 and {MAX_CAPTURE_HARD_LIMIT_MS} ms, got {}",
                self.max_capture_ms
            );
        }
        if self.silence_tail_ms < MIN_SILENCE_TAIL_MS || self.silence_tail_ms > self.max_capture_ms
        {
            bail!(
                "--silence-tail-ms must be >={MIN_SILENCE_TAIL_MS} and <= --max-capture-ms ({})",
                self.max_capture_ms
            );
        }
        if !(1..=100).contains(&self.calibration_blocks) {
            bail!(
                "--calibration-blocks must be between 1 and 100, got {}",
                self.calibration_blocks
            );
        }
        // Calibration must finish well inside the block budget or a session
        // could time out before it ever listens.
        let block_ms = (self.block_size as u64 * 1_000) / u64::from(self.sample_rate);
        if self.calibration_blocks as u64 * block_ms.max(1) >= self.max_capture_ms {
            bail!(
                "--calibration-blocks ({}) uses up the entire --max-capture-ms budget",
                self.calibration_blocks
            );
        }
        if !(0.0..=1.0).contains(&self.silence_threshold) {
            bail!(
                "--silence-threshold must be between 0.0 and 1.0, got {}",
                self.silence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.speech_threshold) {
            bail!(
                "--speech-threshold must be between 0.0 and 1.0, got {}",
                self.speech_threshold
            );
        }
        if self.speech_threshold < self.silence_threshold {
            bail!(
                "--speech-threshold ({}) must not be below --silence-threshold ({})",
                self.speech_threshold,
                self.silence_threshold
            );
        }
        if !(8..=1_024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 1024, got {}",
                self.channel_capacity
            );
        }
        if !(0.0..=32_767.0).contains(&self.min_utterance_level) {
            bail!(
                "--min-utterance-level must be between 0 and 32767, got {}",
                self.min_utterance_level
            );
        }
        if self.retry_backoff_ms > 60_000 {
            bail!(
                "--retry-backoff-ms must be at most 60000 ms, got {}",
                self.retry_backoff_ms
            );
        }
        if self.stop_grace_ms > 5_000 {
            bail!(
                "--stop-grace-ms must be at most 5000 ms, got {}",
                self.stop_grace_ms
            );
        }
        if !(10..=2_000).contains(&self.echo_chunk_ms) {
            bail!(
                "--echo-chunk-ms must be between 10 and 2000 ms, got {}",
                self.echo_chunk_ms
            );
        }

        if let Some(device) = &mut self.input_device {
            let trimmed = device.trim();
            if trimmed.is_empty() {
                bail!("--input-device must not be empty");
            }
            if trimmed.len() > 256 || trimmed.chars().any(char::is_control) {
                bail!("--input-device must be <=256 characters with no control characters");
            }
            *device = trimmed.to_string();
        }

        Ok(())
    }

    /// Snapshot the CLI-controlled capture settings for the worker thread.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            silence_tail_ms: self.silence_tail_ms,
            calibration_blocks: self.calibration_blocks,
            max_capture_ms: self.max_capture_ms,
            silence_threshold: self.silence_threshold,
            speech_threshold: self.speech_threshold,
            channel_capacity: self.channel_capacity,
            min_utterance_level: self.min_utterance_level,
            retry_backoff_ms: self.retry_backoff_ms,
            stop_grace_ms: self.stop_grace_ms,
        }
    }
}
