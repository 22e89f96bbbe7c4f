/*!
 * Core Module
 * Fundamental types, configuration, error handling and sync primitives
 */

pub mod config;
pub mod errors;
pub mod id;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use config::{IoConfig, RemoveLockOptions};
pub use errors::*;
pub use id::{IdGenerator, RecyclingGenerator, RequestIdGenerator};
pub use types::*;
