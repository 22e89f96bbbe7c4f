/*!
 * Remove Lock / Rundown Protection
 *
 * Lets many threads temporarily pin a resource while work is outstanding,
 * and lets exactly one thread tear it down once every pin is released.
 *
 * # Architecture
 *
 * ```text
 *   acquire() ──CAS──► [ count | removing ] ◄──CAS── release(token)
 *                              │                          │
 *   begin_remove_and_wait() ───┘ set removing             │ count → 0
 *            │                                            ▼
 *            └────────────── wait ◄──────────── drained event (once)
 * ```
 *
 * - Acquire/release are lock-free and never block
 * - Only the removal wait suspends the caller
 * - Mismatched releases and double removal panic
 */

mod lock;
mod token;
mod tracking;

pub use lock::{RemoveLock, RemoveLockState, UNTAGGED};
pub use token::RemoveLockToken;
pub use tracking::HolderRecord;
