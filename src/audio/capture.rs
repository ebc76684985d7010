//! Capture session controller.
//!
//! Owns the input stream for exactly one utterance: opens it, pumps blocks
//! through the segmenter while polling the shared conversation flags, and
//! guarantees the stream is stopped and dropped on every exit path. The same
//! per-block session type drives both the live CPAL loop and the offline
//! driver the tests use.

use super::device::resolve_input_device;
use super::dispatch::BlockDispatcher;
use super::meter::LiveMeter;
use super::resample::convert_block_to_target;
use super::segment::{mean_abs_level, to_pcm16, BlockStatus, SegmentResult, Segmenter, SegmenterConfig};
use crate::config::CaptureConfig;
use crate::log_debug;
use crate::state::ConversationState;
use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How one capture session ended.
///
/// Timeout, cancellation, and gated-to-nothing are normal outcomes, not
/// errors; only `StreamError` reflects a device fault, and even that aborts
/// just the current utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Fixed-point utterance ready for the agent pipeline.
    Utterance(Vec<i16>),
    /// Timed out without speech; try again next turn.
    NoSpeech,
    /// Stop or mic-mute interrupted the capture; partial audio is discarded.
    Cancelled,
    /// Speech was heard but the noise gate removed every sample.
    Empty,
    /// A read fault invalidated the whole utterance.
    StreamError(String),
}

impl CaptureOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CaptureOutcome::Utterance(_) => "utterance",
            CaptureOutcome::NoSpeech => "no_speech",
            CaptureOutcome::Cancelled => "cancelled",
            CaptureOutcome::Empty => "empty",
            CaptureOutcome::StreamError(_) => "stream_error",
        }
    }

    /// Collapse to the plain "did we get audio" view callers mostly want.
    pub fn into_samples(self) -> Option<Vec<i16>> {
        match self {
            CaptureOutcome::Utterance(samples) => Some(samples),
            _ => None,
        }
    }
}

/// Per-block session state shared by the live and offline capture paths.
pub(super) struct CaptureSession {
    state: ConversationState,
    segmenter: Segmenter,
    meter: Option<LiveMeter>,
}

impl CaptureSession {
    pub(super) fn new(
        cfg: &SegmenterConfig,
        state: ConversationState,
        meter: Option<LiveMeter>,
    ) -> Self {
        Self {
            state,
            segmenter: Segmenter::new(cfg),
            meter,
        }
    }

    /// Returns `true` when stop or mic-mute has been requested. Checked
    /// before every block so cancellation lands within one block's duration.
    pub(super) fn cancelled(&self) -> bool {
        !self.state.is_running() || self.state.mic_muted()
    }

    /// Feed one normalized block; `Some` means the session is over.
    pub(super) fn process_block(&mut self, block: &[f32]) -> Option<CaptureOutcome> {
        if self.cancelled() {
            return Some(CaptureOutcome::Cancelled);
        }
        if let Some(meter) = &self.meter {
            meter.set_level(mean_abs_level(block));
        }
        match self.segmenter.push_block(block) {
            BlockStatus::Continue => None,
            BlockStatus::SilenceAfterSpeech | BlockStatus::TimedOut => Some(self.wrap_up()),
        }
    }

    pub(super) fn finish(mut self) -> CaptureOutcome {
        if self.cancelled() {
            return CaptureOutcome::Cancelled;
        }
        self.wrap_up()
    }

    fn wrap_up(&mut self) -> CaptureOutcome {
        let segmenter = std::mem::replace(&mut self.segmenter, Segmenter::new(&SegmenterConfig::default()));
        match segmenter.into_result() {
            SegmentResult::NoSpeech => CaptureOutcome::NoSpeech,
            SegmentResult::Empty => CaptureOutcome::Empty,
            SegmentResult::Samples(samples) => CaptureOutcome::Utterance(to_pcm16(&samples)),
        }
    }
}

/// Drive a session from pre-framed blocks. Used by tests and the offline
/// tuning harness; behavior is identical to the live loop minus the device.
pub fn capture_from_blocks<I>(
    blocks: I,
    cfg: &SegmenterConfig,
    state: &ConversationState,
    meter: Option<LiveMeter>,
) -> CaptureOutcome
where
    I: IntoIterator<Item = Vec<f32>>,
{
    let mut session = CaptureSession::new(cfg, state.clone(), meter);
    for block in blocks {
        if let Some(outcome) = session.process_block(&block) {
            return outcome;
        }
    }
    session.finish()
}

/// Audio input wrapper; resolves a device once and opens one stream per
/// captured utterance.
pub struct Microphone {
    device: cpal::Device,
}

impl Microphone {
    pub fn new(preferred: Option<&str>) -> Result<Self> {
        let device = resolve_input_device(preferred)?;
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown input device".to_string())
    }

    /// Capture one utterance, or report why none was produced.
    ///
    /// Preconditions: the conversation must be running and the mic unmuted,
    /// otherwise this returns `Cancelled` without touching the device. The
    /// stream opened here is stopped and dropped on every exit path.
    pub fn capture_utterance(
        &self,
        cfg: &CaptureConfig,
        state: &ConversationState,
        meter: Option<LiveMeter>,
    ) -> Result<CaptureOutcome> {
        if !state.is_running() || state.mic_muted() {
            log_debug("capture skipped: conversation stopped or mic muted");
            return Ok(CaptureOutcome::Cancelled);
        }

        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        let block_ms =
            ((cfg.block_size as u64 * 1000) / u64::from(cfg.sample_rate.max(1))).max(5);
        // Same block duration at the device's native rate.
        let device_block_samples = ((u64::from(device_rate) * cfg.block_size as u64)
            / u64::from(cfg.sample_rate.max(1)))
        .max(1) as usize;

        log_debug(&format!(
            "capture config: device='{}' format={format:?} rate={device_rate}Hz channels={channels} block={}",
            self.device_name(),
            cfg.block_size
        ));

        let (sender, receiver) = bounded::<Vec<f32>>(cfg.channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(BlockDispatcher::new(
            device_block_samples,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;

        let segmenter_cfg = SegmenterConfig::from(cfg);
        let mut session = CaptureSession::new(&segmenter_cfg, state.clone(), meter.clone());
        let wait_time = Duration::from_millis(block_ms);
        // CPAL has no per-read fault like a blocking read would; a callback
        // that stops delivering for this long is the equivalent failure.
        let missed_read_limit = ((2_000 / block_ms).max(4)) as usize;
        let mut missed_reads = 0usize;

        let outcome = loop {
            match receiver.recv_timeout(wait_time) {
                Ok(block) => {
                    missed_reads = 0;
                    let block = convert_block_to_target(
                        block,
                        device_rate,
                        cfg.sample_rate,
                        cfg.block_size,
                    );
                    if let Some(outcome) = session.process_block(&block) {
                        break outcome;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if session.cancelled() {
                        break CaptureOutcome::Cancelled;
                    }
                    missed_reads += 1;
                    if missed_reads >= missed_read_limit {
                        break CaptureOutcome::StreamError(
                            "input stream stopped delivering audio".to_string(),
                        );
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break CaptureOutcome::StreamError("input stream disconnected".to_string());
                }
            }
        };

        // Stop and close on every path; tolerate an already-dead stream.
        if let Err(err) = stream.pause() {
            log_debug(&format!("failed to pause input stream: {err}"));
        }
        drop(stream);
        if let Some(meter) = &meter {
            meter.reset();
        }

        let blocks_dropped = dropped.load(Ordering::Relaxed);
        log_debug(&format!(
            "capture finished: outcome={} blocks_dropped={blocks_dropped}",
            outcome.label()
        ));
        Ok(outcome)
    }
}
