//! Core of a voice-driven customer support assistant: calibrated microphone
//! capture with voice-activity segmentation, a background conversation worker,
//! and speaker playback, glued together by a small set of shared mute/run
//! flags.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod playback;
pub mod state;
pub mod worker;

mod logging;
mod telemetry;

pub use logging::{init_logging, log_debug, log_debug_content, log_panic};
pub use telemetry::init_tracing;
