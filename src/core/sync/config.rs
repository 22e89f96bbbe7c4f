/*!
 * Synchronization Configuration
 *
 * Runtime configuration for spin/backoff behaviour
 */

use crate::core::limits::{DEFAULT_SPIN_LIMIT, SPIN_YIELD_INTERVAL};
use serde::{Deserialize, Serialize};

/// Synchronization configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Busy spins before a waiter starts yielding
    pub spin_limit: u32,
    /// Yield every N spins once past the spin limit
    pub yield_interval: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            spin_limit: DEFAULT_SPIN_LIMIT,
            yield_interval: SPIN_YIELD_INTERVAL,
        }
    }
}

impl SyncConfig {
    /// Configuration for very short critical sections
    pub const fn low_latency() -> Self {
        Self {
            spin_limit: 500,
            yield_interval: 50,
        }
    }

    /// Configuration that yields almost immediately (oversubscribed hosts)
    pub const fn long_wait() -> Self {
        Self {
            spin_limit: 10,
            yield_interval: 1,
        }
    }
}
