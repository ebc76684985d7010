//! Input device resolution.
//!
//! Prefers the system default; when no default is configured, scans the
//! enumeration order for the first device that actually exposes input
//! channels. No stream is opened here.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};

/// List microphone names so the control surface can show a selector.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("failed to enumerate audio devices")?;
    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Resolve the input device a capture session should open.
///
/// Fails only when no device with input channels exists; that is fatal at
/// startup per the error policy.
pub fn resolve_input_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(name) = preferred {
        let mut devices = host.input_devices().context("failed to enumerate audio devices")?;
        return devices
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("input device '{name}' not found"));
    }

    if let Some(device) = host.default_input_device() {
        return Ok(device);
    }

    // No default configured: take the first device that reports input
    // channels, in enumeration order.
    let devices = host.input_devices().context("failed to enumerate audio devices")?;
    for device in devices {
        if let Ok(config) = device.default_input_config() {
            if config.channels() > 0 {
                return Ok(device);
            }
        }
    }
    Err(anyhow!("no audio input devices found"))
}
