//! Background conversation worker.
//!
//! One thread owns the whole conversation: capture, agent pipeline, and
//! playback all run here, because the audio streams it builds cannot move
//! between threads. The control surface only flips [`ConversationState`]
//! flags and joins the thread on stop.

use crate::audio::{CaptureOutcome, LiveMeter, Microphone};
use crate::config::CaptureConfig;
use crate::pipeline::{AgentPipeline, LifecycleEvent, ResponseEvent};
use crate::playback::AudioSink;
use crate::state::ConversationState;
use crate::{log_debug, log_debug_content};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver};
use std::thread::JoinHandle;
use std::time::Duration;

/// Yields one captured utterance per call. The microphone implements this;
/// tests script it.
pub trait UtteranceSource {
    fn next_utterance(&mut self, state: &ConversationState) -> Result<CaptureOutcome>;
}

/// Live microphone source.
pub struct MicSource {
    mic: Microphone,
    cfg: CaptureConfig,
    meter: Option<LiveMeter>,
}

impl MicSource {
    pub fn new(mic: Microphone, cfg: CaptureConfig, meter: Option<LiveMeter>) -> Self {
        Self { mic, cfg, meter }
    }
}

impl UtteranceSource for MicSource {
    fn next_utterance(&mut self, state: &ConversationState) -> Result<CaptureOutcome> {
        self.mic.capture_utterance(&self.cfg, state, self.meter.clone())
    }
}

/// Everything one conversation needs, built inside the worker thread because
/// the audio streams are not `Send`.
pub struct TurnParts {
    pub source: Box<dyn UtteranceSource>,
    pub pipeline: Box<dyn AgentPipeline>,
    pub sink: Box<dyn AudioSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerExit {
    Finished,
    Failed(String),
}

/// Join handle plus the exit report channel.
pub struct ConversationHandle {
    state: ConversationState,
    thread: JoinHandle<()>,
    exit: Receiver<WorkerExit>,
    stop_grace_ms: u64,
}

impl ConversationHandle {
    /// Request a stop, give in-flight audio a moment to wind down, then join
    /// the worker and surface any failure it reported.
    pub fn stop(self) -> Result<()> {
        self.state.request_stop();
        std::thread::sleep(Duration::from_millis(self.stop_grace_ms));
        let exit = self.exit.recv().unwrap_or(WorkerExit::Finished);
        if self.thread.join().is_err() {
            return Err(anyhow!("conversation worker panicked"));
        }
        match exit {
            WorkerExit::Finished => Ok(()),
            WorkerExit::Failed(msg) => Err(anyhow!("conversation worker failed: {msg}")),
        }
    }
}

/// Start the conversation worker. Returns `None` when a conversation is
/// already running; the builder runs on the worker thread.
pub fn start_conversation<F>(
    state: &ConversationState,
    cfg: CaptureConfig,
    build: F,
) -> Option<ConversationHandle>
where
    F: FnOnce() -> Result<TurnParts> + Send + 'static,
{
    if !state.try_start() {
        log_debug("start rejected: conversation already running");
        return None;
    }

    let worker_state = state.clone();
    let (exit_tx, exit_rx) = bounded(1);
    let stop_grace_ms = cfg.stop_grace_ms;

    let thread = std::thread::spawn(move || {
        let exit = match build() {
            Ok(parts) => match run_conversation_loop(&worker_state, &cfg, parts) {
                Ok(()) => WorkerExit::Finished,
                Err(err) => WorkerExit::Failed(err.to_string()),
            },
            Err(err) => {
                log_debug(&format!("conversation setup failed: {err:#}"));
                WorkerExit::Failed(err.to_string())
            }
        };
        // The running flag always clears on exit, whatever the path.
        worker_state.request_stop();
        let _ = exit_tx.send(exit);
    });

    Some(ConversationHandle {
        state: state.clone(),
        thread,
        exit: exit_rx,
        stop_grace_ms,
    })
}

/// Sleep in short slices so a stop request is honored promptly.
fn backoff(state: &ConversationState, ms: u64) {
    let mut remaining = ms;
    while remaining > 0 && state.is_running() {
        let slice = remaining.min(50);
        std::thread::sleep(Duration::from_millis(slice));
        remaining -= slice;
    }
}

/// Capture, run the pipeline, play the response, repeat until stopped.
///
/// Per-turn problems (no speech, pipeline error, stream fault) log, back off,
/// and retry; only a playback write failure is fatal to the conversation.
pub fn run_conversation_loop(
    state: &ConversationState,
    cfg: &CaptureConfig,
    parts: TurnParts,
) -> Result<()> {
    let TurnParts {
        mut source,
        mut pipeline,
        mut sink,
    } = parts;

    while state.is_running() {
        let outcome = match source.next_utterance(state) {
            Ok(outcome) => outcome,
            Err(err) => {
                log_debug(&format!("capture failed: {err:#}"));
                backoff(state, cfg.retry_backoff_ms);
                continue;
            }
        };

        let label = outcome.label();
        let samples = match outcome.into_samples() {
            Some(samples) => samples,
            None => {
                log_debug(&format!("no utterance this turn ({label})"));
                backoff(state, cfg.retry_backoff_ms);
                continue;
            }
        };

        let level = mean_abs_i16(&samples);
        if level < cfg.min_utterance_level {
            // Gated-out near-silence; retry immediately, the caller is there.
            log_debug(&format!("utterance too quiet (level {level:.1}), skipping"));
            continue;
        }

        tracing::info!(samples = samples.len(), level, "utterance captured");

        let stream = match pipeline.run(samples) {
            Ok(stream) => stream,
            Err(err) => {
                log_debug(&format!("pipeline failed: {err:#}"));
                backoff(state, cfg.retry_backoff_ms);
                continue;
            }
        };

        let mut audio_chunks = 0usize;
        for event in stream {
            if !state.is_running() {
                break;
            }
            match event {
                ResponseEvent::AudioChunk(chunk) => {
                    if state.speaker_muted() {
                        continue;
                    }
                    audio_chunks += 1;
                    sink.write(&chunk)?;
                }
                ResponseEvent::TextDelta(text) => {
                    log_debug_content(&format!("assistant: {text}"));
                }
                ResponseEvent::Lifecycle(LifecycleEvent::SessionEnded) => break,
                ResponseEvent::Lifecycle(LifecycleEvent::Other) => {}
            }
        }
        if let Err(err) = sink.finish() {
            log_debug(&format!("sink drain failed: {err:#}"));
        }
        tracing::info!(audio_chunks, "turn complete");
    }

    Ok(())
}

/// Mean absolute amplitude in raw i16 units, the post-gate loudness check.
fn mean_abs_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s).abs()).sum();
    (sum / samples.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct ScriptedSource {
        script: VecDeque<Result<CaptureOutcome>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<CaptureOutcome>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl UtteranceSource for ScriptedSource {
        fn next_utterance(&mut self, state: &ConversationState) -> Result<CaptureOutcome> {
            match self.script.pop_front() {
                Some(item) => item,
                None => {
                    state.request_stop();
                    Ok(CaptureOutcome::Cancelled)
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        written: Arc<Mutex<Vec<Vec<i16>>>>,
    }

    impl AudioSink for RecordingSink {
        fn write(&mut self, samples: &[i16]) -> Result<()> {
            self.written.lock().unwrap().push(samples.to_vec());
            Ok(())
        }
    }

    fn test_cfg() -> CaptureConfig {
        CaptureConfig {
            retry_backoff_ms: 0,
            stop_grace_ms: 0,
            ..CaptureConfig::default()
        }
    }

    fn parts(
        source: ScriptedSource,
        pipeline: impl AgentPipeline + 'static,
        sink: RecordingSink,
    ) -> TurnParts {
        TurnParts {
            source: Box::new(source),
            pipeline: Box::new(pipeline),
            sink: Box::new(sink),
        }
    }

    #[test]
    fn quiet_utterances_never_reach_the_pipeline() {
        let state = ConversationState::new();
        assert!(state.try_start());
        let sink = RecordingSink::default();
        let source = ScriptedSource::new(vec![Ok(CaptureOutcome::Utterance(vec![1i16; 512]))]);
        let pipeline = crate::pipeline::EchoPipeline::new(256);

        run_conversation_loop(&state, &test_cfg(), parts(source, pipeline, sink.clone())).unwrap();
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[test]
    fn loud_utterance_plays_back_through_the_sink() {
        let state = ConversationState::new();
        assert!(state.try_start());
        let sink = RecordingSink::default();
        let source =
            ScriptedSource::new(vec![Ok(CaptureOutcome::Utterance(vec![1_000i16; 512]))]);
        let pipeline = crate::pipeline::EchoPipeline::new(256);

        run_conversation_loop(&state, &test_cfg(), parts(source, pipeline, sink.clone())).unwrap();
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].len(), 256);
    }

    #[test]
    fn speaker_mute_drops_audio_without_stopping_the_turn() {
        let state = ConversationState::new();
        assert!(state.try_start());
        state.set_speaker_muted(true);
        let sink = RecordingSink::default();
        let source =
            ScriptedSource::new(vec![Ok(CaptureOutcome::Utterance(vec![1_000i16; 512]))]);
        let pipeline = crate::pipeline::EchoPipeline::new(256);

        run_conversation_loop(&state, &test_cfg(), parts(source, pipeline, sink.clone())).unwrap();
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[test]
    fn events_after_session_end_are_ignored() {
        struct TailingPipeline;
        impl AgentPipeline for TailingPipeline {
            fn run(&mut self, _utterance: Vec<i16>) -> Result<crate::pipeline::ResponseStream> {
                Ok(Box::new(
                    vec![
                        ResponseEvent::AudioChunk(vec![1i16; 8]),
                        ResponseEvent::Lifecycle(LifecycleEvent::SessionEnded),
                        ResponseEvent::AudioChunk(vec![2i16; 8]),
                    ]
                    .into_iter(),
                ))
            }
        }

        let state = ConversationState::new();
        assert!(state.try_start());
        let sink = RecordingSink::default();
        let source =
            ScriptedSource::new(vec![Ok(CaptureOutcome::Utterance(vec![1_000i16; 512]))]);

        run_conversation_loop(&state, &test_cfg(), parts(source, TailingPipeline, sink.clone()))
            .unwrap();
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], vec![1i16; 8]);
    }

    #[test]
    fn capture_errors_retry_instead_of_killing_the_worker() {
        let state = ConversationState::new();
        assert!(state.try_start());
        let sink = RecordingSink::default();
        let source = ScriptedSource::new(vec![
            Err(anyhow!("device unplugged")),
            Ok(CaptureOutcome::Utterance(vec![1_000i16; 512])),
        ]);
        let pipeline = crate::pipeline::EchoPipeline::new(512);

        run_conversation_loop(&state, &test_cfg(), parts(source, pipeline, sink.clone())).unwrap();
        assert_eq!(sink.written.lock().unwrap().len(), 1);
    }

    #[test]
    fn build_failure_clears_the_running_flag() {
        let state = ConversationState::new();
        let handle = start_conversation(&state, test_cfg(), || Err(anyhow!("no devices")))
            .expect("state was idle");
        let result = handle.stop();
        assert!(result.is_err());
        assert!(!state.is_running());
    }

    /// Holds the worker in its first capture until released, so the test can
    /// probe the running state without racing the thread.
    struct BlockingSource {
        release: crossbeam_channel::Receiver<()>,
    }

    impl UtteranceSource for BlockingSource {
        fn next_utterance(&mut self, state: &ConversationState) -> Result<CaptureOutcome> {
            let _ = self.release.recv();
            state.request_stop();
            Ok(CaptureOutcome::Cancelled)
        }
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let state = ConversationState::new();
        let (release_tx, release_rx) = bounded(1);
        let handle = start_conversation(&state, test_cfg(), move || {
            Ok(TurnParts {
                source: Box::new(BlockingSource {
                    release: release_rx,
                }),
                pipeline: Box::new(crate::pipeline::EchoPipeline::new(256)),
                sink: Box::new(RecordingSink::default()),
            })
        })
        .expect("state was idle");

        assert!(start_conversation(&state, test_cfg(), || Err(anyhow!("unused"))).is_none());
        release_tx.send(()).unwrap();
        handle.stop().unwrap();
    }
}
