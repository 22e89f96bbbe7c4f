/*!
 * Adaptive Backoff
 *
 * Spin-then-yield backoff for CAS retry loops and spinlock acquisition.
 * Spins with exponentially growing pause counts, then starts yielding to the
 * OS scheduler so a preempted lock holder can make progress.
 */

use super::config::SyncConfig;
use crate::core::limits::MAX_BACKOFF_SHIFT;
use std::hint;
use std::thread;

/// Per-wait backoff state
///
/// Create one per contended wait; it is cheap and not shared.
#[derive(Debug)]
pub struct Backoff {
    config: SyncConfig,
    step: u32,
}

impl Backoff {
    #[inline]
    pub fn new(config: SyncConfig) -> Self {
        Self { config, step: 0 }
    }

    #[inline]
    pub fn with_defaults() -> Self {
        Self::new(SyncConfig::default())
    }

    /// Back off after a failed CAS
    ///
    /// Never yields; use in lock-free retry loops where the competing thread
    /// is guaranteed to be making progress.
    #[inline]
    pub fn spin(&mut self) {
        for _ in 0..(1u32 << self.step.min(MAX_BACKOFF_SHIFT)) {
            hint::spin_loop();
        }
        self.step = self.step.saturating_add(1);
    }

    /// Back off while waiting for another thread to release something
    ///
    /// Spins up to the configured limit, then yields every `yield_interval`
    /// steps.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step < self.config.spin_limit {
            self.spin();
            return;
        }

        let interval = self.config.yield_interval.max(1);
        if self.step % interval == 0 {
            thread::yield_now();
        } else {
            hint::spin_loop();
        }
        self.step = self.step.saturating_add(1);
    }

    /// Whether the spin phase is over
    #[inline]
    pub fn is_yielding(&self) -> bool {
        self.step >= self.config.spin_limit
    }

    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Steps taken so far (diagnostics)
    #[inline]
    pub fn steps(&self) -> u32 {
        self.step
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::with_defaults()
    }
}
