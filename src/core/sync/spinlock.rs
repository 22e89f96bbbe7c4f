/*!
 * Spinlock
 *
 * Busy-wait lock for very short, non-blocking critical sections (the
 * immediate work queue). Built on `bit_test_and_set` with test-and-test-and-set
 * spinning and adaptive backoff.
 */

use super::backoff::Backoff;
use super::config::SyncConfig;
use super::interlocked::{bit_test_and_reset, bit_test_and_set};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

const LOCK_BIT: u32 = 0;

/// Spinlock protecting a `T`
///
/// Holders must not block, sleep or allocate unboundedly while the guard is
/// alive; waiters burn CPU until it is dropped.
pub struct SpinLock<T> {
    word: AtomicU32,
    config: SyncConfig,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `word`; sharing the lock only
// requires that `T` can be sent to whichever thread holds it.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub fn new(value: T) -> Self {
        Self::with_config(value, SyncConfig::default())
    }

    pub fn with_config(value: T, config: SyncConfig) -> Self {
        Self {
            word: AtomicU32::new(0),
            config,
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it is free
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let mut backoff = Backoff::new(self.config);
        loop {
            if !bit_test_and_set(&self.word, LOCK_BIT) {
                return SpinLockGuard { lock: self };
            }
            // Spin on a plain load to keep the cache line shared
            while self.is_locked() {
                backoff.snooze();
            }
        }
    }

    /// Acquire the lock only if it is free right now
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if bit_test_and_set(&self.word, LOCK_BIT) {
            None
        } else {
            Some(SpinLockGuard { lock: self })
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Relaxed) & (1 << LOCK_BIT) != 0
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// RAII guard; the lock is released on drop
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the lock bit
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock bit
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        let was_locked = bit_test_and_reset(&self.lock.word, LOCK_BIT);
        debug_assert!(was_locked, "spinlock released while not held");
    }
}
