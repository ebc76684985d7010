//! Sample-rate normalization from the device's native rate to the 24 kHz the
//! agent pipeline expects. The `high-quality-audio` feature routes through
//! rubato's sinc resampler; otherwise a small FIR low-pass plus linear
//! interpolation keeps speech free of obvious aliasing.

use super::TARGET_RATE;
#[cfg(feature = "high-quality-audio")]
use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
use std::f32::consts::PI;
#[cfg(feature = "high-quality-audio")]
use std::sync::atomic::{AtomicBool, Ordering};

// Practical microphone rate bounds; anything outside is treated as a driver
// bug and passed through untouched rather than amplified into garbage.
pub(super) const MIN_SOURCE_RATE: u32 = 4_000;
pub(super) const MAX_SOURCE_RATE: u32 = 384_000;
const MAX_FIR_TAPS: usize = 129;

#[cfg(feature = "high-quality-audio")]
static SINC_FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// Convert a device-rate buffer to `TARGET_RATE`.
pub(super) fn to_target_rate(input: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == 0 || input.is_empty() || source_rate == TARGET_RATE {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match sinc_resample(input, source_rate) {
            Ok(output) => return output,
            Err(err) => {
                if !SINC_FALLBACK_WARNED.swap(true, Ordering::AcqRel) {
                    log_debug(&format!(
                        "sinc resampler failed ({err}); using FIR fallback"
                    ));
                }
            }
        }
    }

    fir_resample(input, source_rate)
}

#[cfg(feature = "high-quality-audio")]
fn sinc_resample(input: &[f32], source_rate: u32) -> Result<Vec<f32>> {
    if !(MIN_SOURCE_RATE..=MAX_SOURCE_RATE).contains(&source_rate) {
        return Err(anyhow!("unsupported source sample rate {source_rate}Hz"));
    }
    let ratio = TARGET_RATE as f64 / source_rate as f64;

    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expected = (((input.len() as f64) * ratio).round() as usize).max(1).saturating_add(8);
    let mut out = Vec::with_capacity(expected);
    let mut segment = vec![0.0f32; chunk];
    let mut idx = 0usize;
    while idx < input.len() {
        let end = (idx + chunk).min(input.len());
        let len = end - idx;
        let pad = input[end - 1];
        segment.fill(pad);
        segment[..len].copy_from_slice(&input[idx..end]);
        let produced = resampler
            .process(std::slice::from_ref(&segment), None)
            .map_err(|e| anyhow!("sinc resampler process failed: {e:?}"))?;
        out.extend_from_slice(&produced[0]);
        idx = end;
    }

    match out.len().cmp(&expected) {
        CmpOrdering::Greater => out.truncate(expected),
        CmpOrdering::Less => out.resize(expected, *out.last().unwrap_or(&0.0)),
        CmpOrdering::Equal => {}
    }
    Ok(out)
}

pub(super) fn fir_resample(input: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == 0 || input.is_empty() {
        return input.to_vec();
    }
    if !(MIN_SOURCE_RATE..=MAX_SOURCE_RATE).contains(&source_rate) {
        return input.to_vec();
    }

    let ratio = TARGET_RATE as f32 / source_rate as f32;
    let filtered = if source_rate > TARGET_RATE {
        // Decimation needs a low-pass first or 44.1/48 kHz mics alias.
        let taps = decimation_tap_count(source_rate);
        low_pass(input, source_rate, taps)
    } else {
        input.to_vec()
    };
    linear_resample(&filtered, ratio)
}

/// Linear interpolation; fine for speech blocks once the band is limited.
pub(super) fn linear_resample(input: &[f32], ratio: f32) -> Vec<f32> {
    let output_len = (input.len() as f32 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src = i as f32 / ratio;
        let idx = src.floor() as usize;
        let frac = src - idx as f32;
        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input.last().copied().unwrap_or(0.0));
        }
    }
    output
}

/// Short filter near equal rates, longer when collapsing 48 kHz to 24 kHz.
pub(super) fn decimation_tap_count(source_rate: u32) -> usize {
    let ratio = source_rate as f32 / TARGET_RATE as f32;
    let mut taps = (ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_FIR_TAPS)
}

/// Hamming-windowed sinc low-pass at the target Nyquist.
pub(super) fn low_pass(input: &[f32], source_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }
    let cutoff = (TARGET_RATE as f32 * 0.5 / source_rate as f32).min(0.499);
    let coeffs = design_low_pass(cutoff, taps);
    let half = taps / 2;
    let mut output = Vec::with_capacity(input.len());
    for n in 0..input.len() {
        let mut acc = 0.0;
        for (k, coeff) in coeffs.iter().enumerate() {
            if let Some(idx) = (n + k).checked_sub(half) {
                if let Some(sample) = input.get(idx) {
                    acc += *sample * coeff;
                }
            }
        }
        output.push(acc);
    }
    output
}

fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mut coeffs = Vec::with_capacity(taps);
    let m = (taps - 1) as f32;
    for n in 0..taps {
        let centered = n as f32 - m / 2.0;
        let x = 2.0 * PI * normalized_cutoff * centered;
        let sinc = if centered == 0.0 {
            2.0 * normalized_cutoff
        } else {
            (2.0 * normalized_cutoff * x.sin()) / x
        };
        let window = 0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos();
        coeffs.push(sinc * window);
    }
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        for coeff in coeffs.iter_mut() {
            *coeff /= sum;
        }
    }
    coeffs
}

/// Resample one block and pin its length so the segmenter always sees exactly
/// `desired_len` samples.
pub(super) fn convert_block_to_target(
    block: Vec<f32>,
    source_rate: u32,
    target_rate: u32,
    desired_len: usize,
) -> Vec<f32> {
    if source_rate == target_rate {
        return fit_block_length(block, desired_len);
    }
    fit_block_length(to_target_rate(&block, source_rate), desired_len)
}

pub(super) fn fit_block_length(mut data: Vec<f32>, desired: usize) -> Vec<f32> {
    match data.len().cmp(&desired) {
        CmpOrdering::Greater => data.truncate(desired),
        CmpOrdering::Less => {
            let pad = *data.last().unwrap_or(&0.0);
            data.resize(desired, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}
