//! Generation tags for triggerable fetches.
//!
//! Every refresh or source switch takes a new generation. When its result
//! comes back the caller checks whether that generation is still current and
//! drops the result otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic generation counter.
#[derive(Debug, Default)]
pub struct GenerationGate {
    current: AtomicU64,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, superseding every earlier one.
    pub fn begin(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Trailing debounce built on a generation gate: only the last call within
/// `delay` settles.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    gate: GenerationGate,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            gate: GenerationGate::new(),
        }
    }

    /// Wait out the delay. Returns `true` if no newer call arrived meanwhile.
    pub async fn settle(&self) -> bool {
        let generation = self.gate.begin();
        tokio::time::sleep(self.delay).await;
        self.gate.is_current(generation)
    }
}
