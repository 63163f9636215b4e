/*!
 * Synchronization Primitives
 *
 * Closable condition variables with exact-N signaling and cancellable waits.
 *
 * # Architecture
 *
 * - **Registry**: tickets for suspended waiters, the only shared mutable state
 * - **Signaller**: exact-N signal with the registration-race retry protocol,
 *   broadcast, close, and the blocking context-aware signal
 * - **CondVar**: releases the caller's lock around a ticket wait, in an
 *   exclusive (`Cond`) and a shared-read (`RwCond`) flavour
 * - **Context**: cancellation/deadline token for the blocking operations
 *
 * # Guarantees
 *
 * - Every ticket is resolved at most once (woken, closed or cancelled)
 * - Broadcast and close resolve every ticket registered at that instant
 * - After close, every operation stays non-blocking and well-defined
 */

mod cond;
mod config;
mod context;
mod registry;
mod signal;
mod stats;
mod traits;

pub use cond::{Cond, CondVar, RwCond};
pub use config::CondConfig;
pub use context::{CancelHandle, Context};
pub use registry::{Outcome, Registry, Ticket, TicketId};
pub use signal::Signaller;
pub use stats::CondStats;
pub use traits::{Exclusive, LockMode, Relock, SharedRead};
