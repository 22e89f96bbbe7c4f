/*!
 * Core Types
 * Common types used across the request lifecycle
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request identity
///
/// Supplied by the collaborator. An id may only be reused after the previous
/// request carrying it reached Completed or Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Remove lock tag used for holder tracking
pub type Tag = u64;

/// Sort key for insert-by-key ordering
pub type SortKey = u64;

/// Final status reported through a request's completion routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum IoStatus {
    Success,
    Cancelled,
    /// Remove lock was draining when the request arrived
    DeviceNotAvailable,
    /// Deadline elapsed and the sweep cancelled the request
    Timeout,
    Failed(i32),
}

impl IoStatus {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, IoStatus::Success)
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoStatus::Success => write!(f, "success"),
            IoStatus::Cancelled => write!(f, "cancelled"),
            IoStatus::DeviceNotAvailable => write!(f, "device not available"),
            IoStatus::Timeout => write!(f, "timeout"),
            IoStatus::Failed(code) => write!(f, "failed ({})", code),
        }
    }
}
