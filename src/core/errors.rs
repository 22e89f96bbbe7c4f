/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::RequestId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Remove lock errors
///
/// `AlreadyRemoving` is an ordinary outcome: the caller must reject the new
/// request instead of touching the guarded resource.
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum RemoveLockError {
    #[error("Resource is being removed")]
    #[diagnostic(
        code(remove_lock::already_removing),
        help("The guarded resource has started draining. Reject the request as device-not-available.")
    )]
    AlreadyRemoving,
}

/// Cancel-safe queue errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CsqError {
    #[error("Insert rejected for request {0}: guarding remove lock is draining")]
    #[diagnostic(
        code(csq::rejected),
        help("Acquire the remove lock before inserting and stop submitting once removal begins.")
    )]
    Rejected(RequestId),

    #[error("Queue closed, request {0} not inserted")]
    #[diagnostic(
        code(csq::closed),
        help("The queue was closed for teardown. No further requests are accepted.")
    )]
    Closed(RequestId),

    #[error("Request {0} not found in queue")]
    #[diagnostic(
        code(csq::not_found),
        help("The request was already dequeued, cancelled or completed. This is a benign no-op.")
    )]
    NotFound(RequestId),
}

/// Deferred work dispatcher errors
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("Deferred item is already queued or running")]
    #[diagnostic(
        code(deferred::already_queued),
        help("This item was created in reject mode. Use coalescing mode to fold repeated schedules.")
    )]
    AlreadyQueued,

    #[error("Dispatcher has shut down")]
    #[diagnostic(
        code(deferred::shut_down),
        help("The dispatcher no longer accepts work. Schedule before calling shutdown().")
    )]
    ShutDown,
}

/// Unified I/O error with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum IoError {
    #[error("Device not available")]
    #[diagnostic(
        code(io::device_not_available),
        help("The device is being removed. Fail the request back to its issuer.")
    )]
    DeviceNotAvailable,

    #[error("Remove lock error: {0}")]
    #[diagnostic(transparent)]
    RemoveLock(#[from] RemoveLockError),

    #[error("Queue error: {0}")]
    #[diagnostic(transparent)]
    Queue(#[from] CsqError),

    #[error("Dispatch error: {0}")]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(io::invalid_config),
        help("Check IOCORE_* environment variables or the configuration document.")
    )]
    InvalidConfig(String),

    #[error("Failed to spawn {0} thread: {1}")]
    #[diagnostic(
        code(io::thread_spawn),
        help("The host refused to create a dispatcher thread. Reduce worker_threads or check process limits.")
    )]
    ThreadSpawn(String, String),
}

impl IoError {
    /// Whether the error reports a draining device
    pub fn is_device_not_available(&self) -> bool {
        matches!(
            self,
            IoError::DeviceNotAvailable | IoError::RemoveLock(RemoveLockError::AlreadyRemoving)
        )
    }
}

/// Caller protocol violations
///
/// Never returned as values. Every violation aborts the offending thread with
/// a panic carrying this message, since continuing could free a resource that
/// is still referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Release without a matching acquire
    DoubleRelease,
    /// Second removal of the same resource
    DoubleBeginRemove,
    /// Token released on a lock that did not issue it
    ForeignToken,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::DoubleRelease => {
                write!(f, "remove lock released more times than acquired")
            }
            ProtocolViolation::DoubleBeginRemove => {
                write!(f, "remove lock removal started twice")
            }
            ProtocolViolation::ForeignToken => {
                write!(f, "remove lock token released on a lock that did not issue it")
            }
        }
    }
}

pub type RemoveLockResult<T> = Result<T, RemoveLockError>;
pub type CsqResult<T> = Result<T, CsqError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
pub type IoResult<T> = Result<T, IoError>;
