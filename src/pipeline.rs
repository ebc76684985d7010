//! Agent pipeline seam.
//!
//! The worker hands a completed utterance to an [`AgentPipeline`] and plays
//! back whatever events come out. The event set is closed on purpose: new
//! lifecycle notifications from a backend fold into `Lifecycle(Other)` instead
//! of forcing every consumer to grow a match arm.

use anyhow::Result;

/// Session-level notifications carried alongside audio and text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The backend finished responding; the turn is over.
    SessionEnded,
    /// Any notification the playback loop has no use for.
    Other,
}

/// One event from a response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// PCM to hand to the speaker, 24 kHz mono.
    AudioChunk(Vec<i16>),
    /// Incremental transcript text.
    TextDelta(String),
    Lifecycle(LifecycleEvent),
}

/// Events are pulled on the worker thread, so the stream need not be `Send`.
pub type ResponseStream = Box<dyn Iterator<Item = ResponseEvent>>;

/// Turns an utterance into a stream of response events.
pub trait AgentPipeline {
    fn run(&mut self, utterance: Vec<i16>) -> Result<ResponseStream>;
}

/// Offline pipeline that plays the caller's own audio back in chunks. Stands
/// in for a real agent backend during development and in the demo binary.
pub struct EchoPipeline {
    chunk_samples: usize,
}

impl EchoPipeline {
    pub fn new(chunk_samples: usize) -> Self {
        Self {
            chunk_samples: chunk_samples.max(1),
        }
    }
}

impl AgentPipeline for EchoPipeline {
    fn run(&mut self, utterance: Vec<i16>) -> Result<ResponseStream> {
        let chunk_samples = self.chunk_samples;
        let chunks: Vec<ResponseEvent> = utterance
            .chunks(chunk_samples)
            .map(|c| ResponseEvent::AudioChunk(c.to_vec()))
            .collect();
        let events = chunks
            .into_iter()
            .chain(std::iter::once(ResponseEvent::Lifecycle(
                LifecycleEvent::SessionEnded,
            )));
        Ok(Box::new(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_chunks_audio_and_ends_the_session() {
        let mut pipeline = EchoPipeline::new(4);
        let events: Vec<ResponseEvent> =
            pipeline.run(vec![1i16, 2, 3, 4, 5, 6]).unwrap().collect();
        assert_eq!(
            events,
            vec![
                ResponseEvent::AudioChunk(vec![1, 2, 3, 4]),
                ResponseEvent::AudioChunk(vec![5, 6]),
                ResponseEvent::Lifecycle(LifecycleEvent::SessionEnded),
            ]
        );
    }

    #[test]
    fn empty_utterance_still_ends_the_session() {
        let mut pipeline = EchoPipeline::new(4);
        let events: Vec<ResponseEvent> = pipeline.run(Vec::new()).unwrap().collect();
        assert_eq!(
            events,
            vec![ResponseEvent::Lifecycle(LifecycleEvent::SessionEnded)]
        );
    }
}
