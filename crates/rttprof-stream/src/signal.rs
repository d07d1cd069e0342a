//! Cooperative stop flag shared between the engine and whoever wants it to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set by any holder; observed by the engine between reads.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
