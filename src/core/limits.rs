/*!
 * Limits and Constants
 *
 * Centralized location for thresholds and defaults, grouped by subsystem.
 * Performance-critical constants are marked with [PERF].
 */

use std::time::Duration;

// =============================================================================
// SPIN / BACKOFF
// =============================================================================

/// Spin iterations before a contended spinlock starts yielding
/// [PERF] Short critical sections usually clear within a few hundred spins
pub const DEFAULT_SPIN_LIMIT: u32 = 100;

/// Yield to the OS scheduler every N spins once past the spin limit
pub const SPIN_YIELD_INTERVAL: u32 = 10;

/// Upper bound on the exponential pause count per backoff step
/// [PERF] 2^6 pause instructions keeps a single step well under a microsecond
pub const MAX_BACKOFF_SHIFT: u32 = 6;

// =============================================================================
// REMOVE LOCK
// =============================================================================

/// High watermark disabled (0 = unlimited outstanding references)
pub const DEFAULT_HIGH_WATERMARK: usize = 0;

/// Holders pinned longer than this are reported as stale (when tracking)
pub const DEFAULT_MAX_HELD: Duration = Duration::from_secs(60);

// =============================================================================
// DEFERRED WORK
// =============================================================================

/// Fallback worker count when processor detection fails
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Upper bound on configured worker threads
pub const MAX_WORKER_THREADS: usize = 256;

/// Immediate queue depth above which a warning is logged
/// Immediate items must stay short; a deep queue means a routine is blocking
pub const IMMEDIATE_QUEUE_WARN_DEPTH: usize = 1024;

/// Poll interval for the immediate context when idle
/// [PERF] Parking is unbounded; this only bounds shutdown latency
pub const IMMEDIATE_IDLE_PARK: Duration = Duration::from_millis(50);
