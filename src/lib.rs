/*!
 * wake-cond
 *
 * Closable condition variables for `parking_lot` locks: exact-N signaling,
 * broadcast, permanent close, and context-cancellable waits and signals.
 */

pub mod core;
pub mod monitoring;

// Re-exports
pub use crate::core::errors::{CondError, CondResult, ContextError};
pub use crate::core::sync::{
    CancelHandle, Cond, CondConfig, CondStats, CondVar, Context, Exclusive, LockMode, Relock,
    RwCond, SharedRead,
};
pub use monitoring::init_tracing;
