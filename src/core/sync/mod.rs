/*!
 * Synchronization Primitives
 *
 * Leaf primitives the request lifecycle is built from:
 * - Interlocked word operations (sequentially consistent, never block)
 * - Spinlock for short non-blocking critical sections
 * - Notification/synchronization events for completion signalling
 * - Adaptive spin-then-yield backoff
 */

mod backoff;
mod config;
mod event;
pub mod interlocked;
mod spinlock;

pub use backoff::Backoff;
pub use config::SyncConfig;
pub use event::{Event, EventType};
pub use interlocked::InterlockedWord;
pub use spinlock::{SpinLock, SpinLockGuard};
