/*!
 * Lock-Integrated Condition Variable
 *
 * `CondVar<M>` releases the caller's lock, suspends on a ticket until it is
 * woken, closed or cancelled, then reacquires the lock. `M` selects which
 * half of the lock is given up: [`Exclusive`] for mutexes and write guards,
 * [`SharedRead`] for read guards.
 *
 * # Differences from `std::sync::Condvar`
 *
 * - `signal(n)` wakes an exact number of waiters and reports how many
 * - `close()` permanently releases every current and future waiter
 * - waits and signals can be bounded by a [`Context`]
 * - no spurious wakeups: `wait` returns `true` only after a signal or broadcast
 */

use super::config::CondConfig;
use super::context::Context;
use super::registry::{Outcome, Ticket};
use super::signal::Signaller;
use super::stats::CondStats;
use super::traits::{Exclusive, LockMode, Relock, SharedRead};
use crate::core::errors::{CondError, CondResult, ContextError};
use crate::monitoring::BlockingSpan;
use flume::Selector;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Condition variable waiting on exclusive locks
pub type Cond = CondVar<Exclusive>;

/// Condition variable waiting on shared read locks
pub type RwCond = CondVar<SharedRead>;

/// Closable condition variable
///
/// Clones share the same waiters. Every operation stays safe after
/// [`close`](Self::close); waits simply stop blocking.
///
/// # Examples
///
/// ```
/// use wake_cond::Cond;
/// use parking_lot::Mutex;
/// use std::sync::Arc;
/// use std::thread;
///
/// let state = Arc::new((Mutex::new(false), Cond::new()));
/// let worker_state = state.clone();
///
/// let worker = thread::spawn(move || {
///     let (lock, cond) = &*worker_state;
///     let mut ready = lock.lock();
///     while !*ready {
///         if !cond.wait(&mut ready) {
///             return false; // closed
///         }
///     }
///     true
/// });
///
/// let (lock, cond) = &*state;
/// *lock.lock() = true;
/// cond.broadcast();
/// # cond.close();
/// assert!(worker.join().unwrap());
/// ```
pub struct CondVar<M: LockMode> {
    signaller: Arc<Signaller>,
    _mode: PhantomData<fn() -> M>,
}

impl<M: LockMode> CondVar<M> {
    /// Create a condition variable with the default configuration
    pub fn new() -> Self {
        Self::with_config(CondConfig::default())
    }

    pub fn with_config(config: CondConfig) -> Self {
        Self {
            signaller: Arc::new(Signaller::new(config)),
            _mode: PhantomData,
        }
    }

    /// Release the lock, block until woken or closed, reacquire the lock
    ///
    /// Returns `true` if woken by signal/broadcast, `false` if the condition
    /// variable was closed. The lock is held again on return either way.
    pub fn wait<G: Relock<M>>(&self, guard: &mut G) -> bool {
        let ticket = self.signaller.register();
        guard.relock(|| ticket.wait()).is_woken()
    }

    /// Like [`wait`](Self::wait), but also gives up when `ctx` is cancelled
    ///
    /// - `Ok(true)`: woken by signal/broadcast
    /// - `Ok(false)`: closed
    /// - `Err(CondError::Interrupted(_))`: `ctx` was cancelled before any
    ///   wake or close reached this waiter
    ///
    /// The lock is held again on return in every case.
    pub fn wait_with_context<G: Relock<M>>(&self, guard: &mut G, ctx: &Context) -> CondResult<bool> {
        let span = BlockingSpan::new("wait_with_context", 1);
        let _entered = span.enter();

        let ticket = self.signaller.register();
        let result = guard.relock(|| self.resolve_with_context(&ticket, ctx));
        span.record_result(match result {
            Ok(true) => "woken",
            Ok(false) => "closed",
            Err(_) => "interrupted",
        });
        result
    }

    /// Like [`wait_with_context`](Self::wait_with_context) with a timeout
    pub fn wait_timeout<G: Relock<M>>(&self, guard: &mut G, timeout: Duration) -> CondResult<bool> {
        let ctx = Context::with_timeout(&Context::background(), timeout);
        self.wait_with_context(guard, &ctx)
    }

    /// Wait while `condition` holds
    ///
    /// The condition is evaluated with the lock held, before every wait.
    /// Returns `true` once it is false, or `false` if the condition variable
    /// is closed while it still holds.
    pub fn wait_while<G, F>(&self, guard: &mut G, mut condition: F) -> bool
    where
        G: Relock<M>,
        F: FnMut(&mut G) -> bool,
    {
        while condition(guard) {
            if !self.wait(guard) {
                return false;
            }
        }
        true
    }

    /// Block on the ticket or the context, whichever resolves first
    fn resolve_with_context(&self, ticket: &Ticket, ctx: &Context) -> CondResult<bool> {
        let selector = Selector::new()
            .recv(ticket.receiver(), |res| Some(res.unwrap_or(Outcome::Closed)))
            .recv(ctx.done(), |_| None);

        let resolved = match ctx.deadline() {
            Some(deadline) => selector.wait_deadline(deadline).unwrap_or(None),
            None => selector.wait(),
        };

        if let Some(outcome) = resolved {
            return Ok(outcome.is_woken());
        }

        // `done` disconnects only on cancellation and the selector only times
        // out at the deadline, so the context is terminal here
        let cause = ctx.err().unwrap_or(ContextError::DeadlineExceeded);

        if self.signaller.registry().cancel(ticket) {
            trace!(ticket = ticket.id(), %cause, "wait cancelled");
            return Err(CondError::Interrupted(cause));
        }

        // A wake or close won the race; its outcome is already delivered
        let outcome = ticket.try_outcome().unwrap_or(Outcome::Closed);
        trace!(ticket = ticket.id(), ?outcome, "cancel lost to resolution");
        Ok(outcome.is_woken())
    }

    /// Wake up to `n` waiters and report how many were woken
    ///
    /// `n == 0` wakes every waiter and reports 0. Never blocks.
    #[inline]
    pub fn signal(&self, n: usize) -> usize {
        self.signaller.signal(n)
    }

    /// Wake exactly `n` waiters, blocking until enough have registered
    ///
    /// Stops early with `Ok` if the condition variable is closed, or with
    /// [`CondError::SignalInterrupted`] if `ctx` is cancelled; the error
    /// carries the number already woken. `n == 0` broadcasts and returns
    /// `Ok(0)` regardless of `ctx`.
    #[inline]
    pub fn signal_with_context(&self, ctx: &Context, n: usize) -> CondResult<usize> {
        self.signaller.signal_with_context(ctx, n)
    }

    /// [`signal_with_context`](Self::signal_with_context) on the tokio blocking pool
    ///
    /// # Performance
    ///
    /// Occupies one blocking-pool thread for the duration of the signal.
    pub async fn signal_with_context_async(&self, ctx: Context, n: usize) -> CondResult<usize> {
        let signaller = Arc::clone(&self.signaller);
        tokio::task::spawn_blocking(move || signaller.signal_with_context(&ctx, n))
            .await
            .map_err(|e| CondError::Join(e.to_string()))?
    }

    /// Wake every waiter
    #[inline]
    pub fn broadcast(&self) {
        self.signaller.broadcast();
    }

    /// Close and wake every waiter; later waits return `false` immediately
    ///
    /// Returns `true` only for the first call.
    #[inline]
    pub fn close(&self) -> bool {
        self.signaller.close()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.signaller.is_closed()
    }

    /// Number of waiters currently waiting for a signal (racy snapshot)
    #[inline]
    pub fn wait_count(&self) -> usize {
        self.signaller.wait_count()
    }

    #[inline]
    pub fn stats(&self) -> CondStats {
        self.signaller.stats()
    }

    #[inline]
    pub fn config(&self) -> &CondConfig {
        self.signaller.config()
    }
}

impl<M: LockMode> Clone for CondVar<M> {
    fn clone(&self) -> Self {
        Self {
            signaller: Arc::clone(&self.signaller),
            _mode: PhantomData,
        }
    }
}

impl<M: LockMode> Default for CondVar<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: LockMode> fmt::Debug for CondVar<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondVar")
            .field("mode", &M::NAME)
            .field("wait_count", &self.wait_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
