use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const IDLE_LEVEL: f32 = 0.0;

/// Lock-free mean-absolute input level the control surface can poll while a
/// capture is in flight. Linear amplitude in [0, 1], matching the units every
/// segmentation threshold uses.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(IDLE_LEVEL.to_bits())),
        }
    }

    pub fn set_level(&self, level: f32) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    /// Called when a capture session closes its stream.
    pub fn reset(&self) {
        self.set_level(IDLE_LEVEL);
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}
