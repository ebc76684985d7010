use super::capture::{capture_from_blocks, CaptureOutcome};
use super::dispatch::{downmix_into, BlockDispatcher};
use super::resample::{convert_block_to_target, fir_resample, linear_resample};
use super::segment::{mean_abs_level, to_pcm16, BlockStatus, Segmenter, SegmenterConfig};
use super::{BLOCK_SIZE, TARGET_RATE};
use crate::state::ConversationState;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

fn block(level: f32) -> Vec<f32> {
    vec![level; BLOCK_SIZE]
}

fn running_state() -> ConversationState {
    let state = ConversationState::default();
    assert!(state.try_start());
    state
}

#[test]
fn default_config_derives_block_counts() {
    let cfg = SegmenterConfig::default();
    // 24000 * 1.0s / 1024 = 23.4375 -> 23 blocks of trailing silence.
    assert_eq!(cfg.blocks_per_silence(), 23);
    // 24000 * 30s / 1024 = 703.125 -> 703 block budget.
    assert_eq!(cfg.max_iterations(), 703);
}

#[test]
fn calibration_blocks_are_not_buffered() {
    let cfg = SegmenterConfig::default();
    let mut segmenter = Segmenter::new(&cfg);
    for _ in 0..cfg.calibration_blocks {
        assert_eq!(segmenter.push_block(&block(0.001)), BlockStatus::Continue);
    }
    let profile = segmenter.profile().copied().expect("calibration finished");
    assert!((profile.noise_floor - 0.0015).abs() < 1e-6);
    assert_eq!(profile.silence_threshold, 0.01);
    assert_eq!(profile.speech_threshold, 0.02);
    // Nothing spoken yet, so draining the machine yields no audio.
    assert!(!segmenter.has_speech());
}

#[test]
fn quiet_session_times_out_as_no_speech() {
    let cfg = SegmenterConfig::default();
    let state = running_state();
    let blocks = (0..cfg.max_iterations() + 5).map(|_| block(0.001));
    let outcome = capture_from_blocks(blocks, &cfg, &state, None);
    assert_eq!(outcome, CaptureOutcome::NoSpeech);
}

#[test]
fn speech_then_silence_produces_full_length_utterance() {
    let cfg = SegmenterConfig::default();
    let state = running_state();
    let speech_blocks = 30;
    let silence_blocks = cfg.blocks_per_silence();
    let blocks = (0..cfg.calibration_blocks)
        .map(|_| block(0.001))
        .chain((0..speech_blocks).map(|_| block(0.1)))
        .chain((0..silence_blocks).map(|_| block(0.001)));

    let samples = capture_from_blocks(blocks, &cfg, &state, None)
        .into_samples()
        .expect("speech followed by silence yields an utterance");

    // Every listening block lands in the buffer, gated blocks as zeros.
    assert_eq!(samples.len(), (speech_blocks + silence_blocks) * BLOCK_SIZE);
    assert_eq!(samples[0], (0.1f32 * 32_767.0) as i16);
    assert!(samples[..speech_blocks * BLOCK_SIZE].iter().all(|&s| s == 3_276));
    assert!(samples[speech_blocks * BLOCK_SIZE..].iter().all(|&s| s == 0));
}

#[test]
fn sub_floor_blocks_are_zero_filled_not_dropped() {
    let cfg = SegmenterConfig::default();
    let mut segmenter = Segmenter::new(&cfg);
    // Ambient at 0.004 puts the noise floor near 0.006.
    for _ in 0..cfg.calibration_blocks {
        segmenter.push_block(&block(0.004));
    }
    segmenter.push_block(&block(0.1));
    segmenter.push_block(&block(0.005));

    match std::mem::replace(&mut segmenter, Segmenter::new(&cfg)).into_result() {
        super::segment::SegmentResult::Samples(samples) => {
            assert_eq!(samples.len(), 2 * BLOCK_SIZE);
            // The 0.005 block is below the floor: kept for timing, silenced.
            assert!(samples[BLOCK_SIZE..].iter().all(|&s| s == 0.0));
            assert!(samples[..BLOCK_SIZE].iter().all(|&s| s == 0.1));
        }
        other => panic!("expected samples, got {other:?}"),
    }
}

#[test]
fn loud_blocks_reset_the_silence_run() {
    let cfg = SegmenterConfig::default();
    let mut segmenter = Segmenter::new(&cfg);
    for _ in 0..cfg.calibration_blocks {
        segmenter.push_block(&block(0.001));
    }
    segmenter.push_block(&block(0.1));
    // Almost a full silence tail, then more speech: the counter restarts.
    for _ in 0..cfg.blocks_per_silence() - 1 {
        assert_eq!(segmenter.push_block(&block(0.001)), BlockStatus::Continue);
    }
    assert_eq!(segmenter.push_block(&block(0.1)), BlockStatus::Continue);
    for _ in 0..cfg.blocks_per_silence() - 1 {
        assert_eq!(segmenter.push_block(&block(0.001)), BlockStatus::Continue);
    }
    assert_eq!(
        segmenter.push_block(&block(0.001)),
        BlockStatus::SilenceAfterSpeech
    );
}

#[test]
fn timeout_with_speech_still_returns_the_buffer() {
    let cfg = SegmenterConfig::default();
    let state = running_state();
    let listening = cfg.max_iterations() - cfg.calibration_blocks;
    let blocks = (0..cfg.calibration_blocks)
        .map(|_| block(0.001))
        .chain((0..listening + 50).map(|_| block(0.1)));

    let samples = capture_from_blocks(blocks, &cfg, &state, None)
        .into_samples()
        .expect("a talker who never stops still gets their audio through");
    assert_eq!(samples.len(), listening * BLOCK_SIZE);
}

#[test]
fn mic_mute_mid_capture_cancels_and_discards() {
    let cfg = SegmenterConfig::default();
    let state = running_state();
    let mute_state = state.clone();
    let blocks = (0..200usize).map(move |i| {
        if i == 40 {
            mute_state.set_mic_muted(true);
        }
        block(0.1)
    });
    let outcome = capture_from_blocks(blocks, &cfg, &state, None);
    assert_eq!(outcome, CaptureOutcome::Cancelled);
}

#[test]
fn mute_during_the_silence_tail_discards_the_latched_speech() {
    let cfg = SegmenterConfig::default();
    let state = running_state();
    let mute_state = state.clone();
    // 10 calibration + 5 speech blocks, then mute 15 blocks into the tail.
    let calibration = cfg.calibration_blocks;
    let total = calibration + 5 + cfg.blocks_per_silence();
    let mute_at = calibration + 5 + 15;
    let blocks = (0..total).map(move |i| {
        if i == mute_at {
            mute_state.set_mic_muted(true);
        }
        if (calibration..calibration + 5).contains(&i) {
            block(0.1)
        } else {
            block(0.001)
        }
    });
    let outcome = capture_from_blocks(blocks, &cfg, &state, None);
    assert_eq!(outcome, CaptureOutcome::Cancelled);
}

#[test]
fn stopped_conversation_cancels_before_the_first_block() {
    let cfg = SegmenterConfig::default();
    let state = ConversationState::default();
    let outcome = capture_from_blocks(vec![block(0.1)], &cfg, &state, None);
    assert_eq!(outcome, CaptureOutcome::Cancelled);
}

#[test]
fn capture_updates_and_meter_reads_live_level() {
    let cfg = SegmenterConfig::default();
    let state = running_state();
    let meter = super::LiveMeter::new();
    let blocks = vec![block(0.25)];
    let _ = capture_from_blocks(blocks, &cfg, &state, Some(meter.clone()));
    assert!((meter.level() - 0.25).abs() < 1e-4);
}

#[test]
fn pcm_conversion_truncates_toward_zero() {
    assert_eq!(
        to_pcm16(&[0.001, -1.0, 1.0, 0.5]),
        vec![32, -32_767, 32_767, 16_383]
    );
}

#[test]
fn mean_level_of_empty_block_is_zero() {
    assert_eq!(mean_abs_level(&[]), 0.0);
    assert!((mean_abs_level(&[0.5, -0.5]) - 0.5).abs() < 1e-7);
}

#[test]
fn custom_tail_changes_block_counts() {
    let cfg = SegmenterConfig {
        silence_tail_ms: 500,
        max_capture_ms: 10_000,
        ..SegmenterConfig::default()
    };
    assert_eq!(cfg.blocks_per_silence(), 12);
    assert_eq!(cfg.max_iterations(), 234);
}

#[test]
fn downmix_averages_interleaved_channels() {
    let mut buf = Vec::new();
    downmix_into(&mut buf, &[1.0f32, 3.0, -2.0, 2.0], 2, |s| s);
    assert_eq!(buf, vec![2.0, 0.0]);

    let mut mono = Vec::new();
    downmix_into(&mut mono, &[4i16, -4], 1, |s| s as f32 / 4.0);
    assert_eq!(mono, vec![1.0, -1.0]);
}

#[test]
fn dispatcher_reframes_driver_buffers_into_fixed_blocks() {
    let (tx, rx) = crossbeam_channel::bounded(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(4, tx, dropped.clone());

    dispatcher.push(&[0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6], 1, |s| s);
    dispatcher.push(&[0.7f32, 0.8, 0.9, 1.0], 1, |s| s);

    assert_eq!(rx.try_recv().unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
    assert_eq!(rx.try_recv().unwrap(), vec![0.5, 0.6, 0.7, 0.8]);
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_drops_blocks_when_channel_is_full() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(2, tx, dropped.clone());

    dispatcher.push(&[0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6], 1, |s| s);
    assert_eq!(rx.try_recv().unwrap(), vec![0.1, 0.2]);
    assert_eq!(dropped.load(std::sync::atomic::Ordering::Relaxed), 2);
}

#[test]
fn linear_resample_halves_length_at_half_ratio() {
    let input = vec![0.5f32; 1024];
    assert_eq!(linear_resample(&input, 0.5).len(), 512);
    assert_eq!(linear_resample(&input, 2.0).len(), 2048);
}

#[test]
fn fir_resample_collapses_48k_to_target_length() {
    let input: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
    let output = fir_resample(&input, 48_000);
    assert_eq!(output.len(), 1024);
}

#[test]
fn block_conversion_pins_the_segmentation_frame_size() {
    let device_block = vec![0.1f32; 2048];
    let out = convert_block_to_target(device_block, 48_000, TARGET_RATE, BLOCK_SIZE);
    assert_eq!(out.len(), BLOCK_SIZE);

    let same_rate = convert_block_to_target(vec![0.1f32; 1000], TARGET_RATE, TARGET_RATE, BLOCK_SIZE);
    assert_eq!(same_rate.len(), BLOCK_SIZE);
}
