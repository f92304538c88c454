//! Cooperative shutdown flag.
//!
//! A single atomic boolean is the only state a signal handler is allowed to
//! touch. Every other component — Replayer, Scheduler, wire transports —
//! polls it at the well-defined points named in the component docs instead
//! of being interrupted directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared shutdown flag. Clone freely; all clones observe the same flag.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Async-signal-safe: may be called from a signal handler context.
    #[inline]
    pub fn signal_set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
