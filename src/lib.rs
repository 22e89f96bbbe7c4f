/*!
 * Driver I/O Core Library
 * Cancel-safe, reference-counted request lifecycle primitives
 *
 * - `remove_lock`: rundown protection for resources with in-flight I/O
 * - `csq`: request envelope and the cancel-safe queue
 * - `deferred`: immediate and worker-pool deferred work
 * - `device`: the three wired together for one removable device
 */

pub mod context;
pub mod core;
pub mod csq;
pub mod deferred;
pub mod device;
pub mod monitoring;
pub mod remove_lock;

// Re-exports
pub use context::IoContext;
pub use core::{
    CsqError, DispatchError, IoConfig, IoError, IoResult, IoStatus, RemoveLockError,
    RemoveLockOptions, RequestId,
};
pub use csq::{CancelSafeQueue, CompletedRequest, Request, RequestState};
pub use deferred::{DeferredItem, Dispatcher, WorkClass};
pub use device::Device;
pub use remove_lock::{RemoveLock, RemoveLockState, RemoveLockToken};
