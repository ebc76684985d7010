//! Speaker output.
//!
//! The worker writes response audio through the [`AudioSink`] seam; the CPAL
//! implementation feeds a bounded channel that the output callback drains,
//! padding with silence when the agent falls behind so the stream never
//! underruns audibly.

use crate::log_debug;
use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::time::Duration;

/// Where response audio goes. Implemented by the CPAL player and by test
/// doubles that record what was written.
pub trait AudioSink {
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Block until queued audio has had time to play out.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Pull queued chunks into the output buffer, zero-filling once the queue
/// runs dry. Kept free of CPAL types so the drain logic is testable.
fn fill_mono(pending: &mut VecDeque<i16>, receiver: &Receiver<Vec<i16>>, out: &mut [i16]) {
    let out_len = out.len();
    for slot in out.iter_mut() {
        if pending.is_empty() {
            while let Ok(chunk) = receiver.try_recv() {
                pending.extend(chunk);
                if pending.len() >= out_len {
                    break;
                }
            }
        }
        *slot = pending.pop_front().unwrap_or(0);
    }
}

/// Plays 24 kHz mono PCM on the default output device.
pub struct CpalPlayer {
    _stream: cpal::Stream,
    sender: Sender<Vec<i16>>,
    sample_rate: u32,
}

impl CpalPlayer {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no audio output device found"))?;
        let default_config = device.default_output_config()?;
        let format = default_config.sample_format();
        let channels = default_config.channels().max(1);
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = bounded::<Vec<i16>>(32);
        let err_fn = |err| log_debug(&format!("audio_output_error: {err}"));
        let channel_count = usize::from(channels);

        let stream = match format {
            SampleFormat::F32 => {
                let mut pending = VecDeque::new();
                let mut mono = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _| {
                        let frames = data.len() / channel_count;
                        mono.resize(frames, 0);
                        fill_mono(&mut pending, &receiver, &mut mono);
                        for (frame, &sample) in mono.iter().enumerate() {
                            let value = sample as f32 / 32_768.0;
                            for ch in 0..channel_count {
                                data[frame * channel_count + ch] = value;
                            }
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let mut pending = VecDeque::new();
                let mut mono = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _| {
                        let frames = data.len() / channel_count;
                        mono.resize(frames, 0);
                        fill_mono(&mut pending, &receiver, &mut mono);
                        for (frame, &sample) in mono.iter().enumerate() {
                            for ch in 0..channel_count {
                                data[frame * channel_count + ch] = sample;
                            }
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported output sample format: {other:?}")),
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            sender,
            sample_rate,
        })
    }
}

impl AudioSink for CpalPlayer {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        // Blocking send gives the agent backpressure instead of unbounded
        // buffering when it produces audio faster than real time.
        self.sender
            .send(samples.to_vec())
            .map_err(|_| anyhow!("output stream closed"))
    }

    fn finish(&mut self) -> Result<()> {
        // Wait for the callback to drain what we queued, bounded so a dead
        // stream cannot hang the worker.
        for _ in 0..200 {
            if self.sender.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        // One output buffer's worth of grace for the tail end.
        std::thread::sleep(Duration::from_millis(
            1_024 * 1_000 / u64::from(self.sample_rate.max(1)),
        ));
        Ok(())
    }
}
