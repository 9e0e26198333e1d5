//! Minimal cooperative shutdown signal, shared by the node loop and every
//! producer task it drives: a cloneable handle backed by a single flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ShutdownGuard {
    flag: Arc<AtomicBool>,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }
}
