//! Shared conversation flags.
//!
//! One conversation at a time, controlled through three atomic booleans that
//! the worker thread and capture loop poll once per audio block. Relaxed
//! ordering is deliberate: each flag is an independent signal and staleness of
//! one block's duration is acceptable by contract.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Flags {
    running: AtomicBool,
    mic_muted: AtomicBool,
    speaker_muted: AtomicBool,
}

/// Cloneable handle to the flag set; every clone observes the same state.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    flags: Arc<Flags>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::Relaxed)
    }

    /// Claim the running flag. Returns `false` when a conversation is already
    /// active, so double-start is rejected without locks.
    pub fn try_start(&self) -> bool {
        !self.flags.running.swap(true, Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.flags.running.store(false, Ordering::Relaxed);
    }

    pub fn mic_muted(&self) -> bool {
        self.flags.mic_muted.load(Ordering::Relaxed)
    }

    pub fn speaker_muted(&self) -> bool {
        self.flags.speaker_muted.load(Ordering::Relaxed)
    }

    pub fn set_mic_muted(&self, muted: bool) {
        self.flags.mic_muted.store(muted, Ordering::Relaxed);
    }

    pub fn set_speaker_muted(&self, muted: bool) {
        self.flags.speaker_muted.store(muted, Ordering::Relaxed);
    }

    /// Flip the mic mute and return the new value.
    pub fn toggle_mic(&self) -> bool {
        !self.flags.mic_muted.fetch_xor(true, Ordering::Relaxed)
    }

    /// Flip the speaker mute and return the new value.
    pub fn toggle_speaker(&self) -> bool {
        !self.flags.speaker_muted.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            conversation_running: self.is_running(),
            microphone_muted: self.mic_muted(),
            speaker_muted: self.speaker_muted(),
        }
    }
}

/// Point-in-time view for the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub conversation_running: bool,
    pub microphone_muted: bool,
    pub speaker_muted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_claims_the_flag_exactly_once() {
        let state = ConversationState::new();
        assert!(state.try_start());
        assert!(!state.try_start());
        state.request_stop();
        assert!(state.try_start());
    }

    #[test]
    fn toggles_return_the_new_value() {
        let state = ConversationState::new();
        assert!(state.toggle_mic());
        assert!(state.mic_muted());
        assert!(!state.toggle_mic());
        assert!(!state.mic_muted());

        assert!(state.toggle_speaker());
        assert!(!state.toggle_speaker());
    }

    #[test]
    fn clones_share_the_same_flags() {
        let state = ConversationState::new();
        let other = state.clone();
        other.set_mic_muted(true);
        assert!(state.mic_muted());
    }

    #[test]
    fn snapshot_serializes_for_the_status_command() {
        let state = ConversationState::new();
        state.try_start();
        state.set_speaker_muted(true);
        let json = serde_json::to_string(&state.snapshot()).unwrap();
        assert_eq!(
            json,
            r#"{"conversation_running":true,"microphone_muted":false,"speaker_muted":true}"#
        );
    }
}
