/*!
 * Waiter Registry
 *
 * The set of currently suspended waiters ("tickets") and the only mutable
 * state a condition variable shares between threads.
 *
 * # Design
 *
 * Each ticket is the receiving half of a single-slot flume channel; the
 * registry keeps the sending half until it resolves the ticket to
 * `Outcome::Woken` or `Outcome::Closed`. Removal from the map and the send
 * happen in the same critical section, so whoever removes a ticket owns its
 * resolution: a cancel that finds the ticket gone knows the outcome is
 * already sitting in the channel.
 *
 * Registration is two-phase. The waiter count is announced before the
 * ticket is inserted under the registry lock, so `count()` can briefly
 * exceed the number of enqueued tickets. Notifiers retry around that window
 * (see `Signaller::signal`).
 */

use super::stats::{CondStats, StatCounters};
use flume::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, trace};

/// Identity of a registered waiter
pub type TicketId = u64;

/// How a ticket was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Resolved by signal or broadcast
    Woken,
    /// Resolved because the registry was closed
    Closed,
}

impl Outcome {
    #[inline(always)]
    pub fn is_woken(&self) -> bool {
        matches!(self, Outcome::Woken)
    }
}

/// One waiter's single-use wake slot
#[derive(Debug)]
pub struct Ticket {
    id: TicketId,
    rx: Receiver<Outcome>,
    /// False for tickets handed out pre-resolved by a closed registry
    enqueued: bool,
}

impl Ticket {
    fn closed(id: TicketId) -> Self {
        let (tx, rx) = flume::bounded(1);
        let _ = tx.try_send(Outcome::Closed);
        Self {
            id,
            rx,
            enqueued: false,
        }
    }

    #[inline]
    pub fn id(&self) -> TicketId {
        self.id
    }

    /// Block until the ticket is resolved
    pub fn wait(&self) -> Outcome {
        // The sender only disappears unresolved if the registry itself is gone
        self.rx.recv().unwrap_or(Outcome::Closed)
    }

    /// Outcome if the ticket is already resolved
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }

    #[inline]
    pub(crate) fn receiver(&self) -> &Receiver<Outcome> {
        &self.rx
    }
}

struct RegistryState {
    tickets: BTreeMap<TicketId, Sender<Outcome>>,
    next_id: TicketId,
}

impl RegistryState {
    /// Remove up to `n` tickets and resolve them to `outcome`
    ///
    /// Tickets whose waiter has gone away are dropped without being counted.
    fn resolve(&mut self, n: usize, outcome: Outcome) -> (usize, usize) {
        let mut resolved = 0;
        let mut removed = 0;
        while resolved < n {
            let Some((_, tx)) = self.tickets.pop_first() else {
                break;
            };
            removed += 1;
            match tx.try_send(outcome) {
                Ok(()) => resolved += 1,
                Err(TrySendError::Disconnected(_)) | Err(TrySendError::Full(_)) => {}
            }
        }
        (resolved, removed)
    }
}

/// Waiter registry
///
/// # Performance
///
/// - `count()` and `is_closed()` are single atomic loads
/// - Mutations take one short internal lock, never the caller's lock
/// - Wakes are delivered in registration order (not a guarantee)
pub struct Registry {
    state: Mutex<RegistryState>,
    /// Announced waiters; may run ahead of `state.tickets.len()`
    count: AtomicUsize,
    /// Written only under `state`
    closed: AtomicBool,
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
    stats: StatCounters,
}

impl Registry {
    pub fn new() -> Self {
        let (doorbell_tx, doorbell_rx) = flume::bounded(1);
        Self {
            state: Mutex::new(RegistryState {
                tickets: BTreeMap::new(),
                next_id: 0,
            }),
            count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            doorbell_tx,
            doorbell_rx,
            stats: StatCounters::default(),
        }
    }

    /// Register a new waiter
    ///
    /// A closed registry hands out a ticket that is already resolved to
    /// `Outcome::Closed`.
    pub fn register(&self) -> Ticket {
        self.announce();
        self.enqueue()
    }

    /// First registration phase: bump the waiter count
    #[inline]
    pub(crate) fn announce(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Second registration phase: insert the ticket announced earlier
    pub(crate) fn enqueue(&self) -> Ticket {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        if self.closed.load(Ordering::Acquire) {
            drop(state);
            self.count.fetch_sub(1, Ordering::AcqRel);
            return Ticket::closed(id);
        }

        let (tx, rx) = flume::bounded(1);
        state.tickets.insert(id, tx);
        drop(state);

        self.stats.record_registered();
        // Full doorbell already has a pending ring
        let _ = self.doorbell_tx.try_send(());

        Ticket {
            id,
            rx,
            enqueued: true,
        }
    }

    /// Number of announced, unresolved waiters
    ///
    /// Racy: only meaningful as a snapshot at the instant of the call.
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wake up to `n` registered waiters; returns how many were woken
    pub fn wake_n(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let (woken, removed) = self.state.lock().resolve(n, Outcome::Woken);
        self.count.fetch_sub(removed, Ordering::AcqRel);
        self.stats.record_woken(woken);
        woken
    }

    /// Wake every registered waiter; returns how many were woken
    pub fn broadcast(&self) -> usize {
        let (woken, removed) = self.state.lock().resolve(usize::MAX, Outcome::Woken);
        self.count.fetch_sub(removed, Ordering::AcqRel);
        self.stats.record_woken(woken);
        woken
    }

    /// Withdraw a ticket that has not been resolved yet
    ///
    /// Returns `false` if a wake or close got there first; the ticket then
    /// keeps its outcome.
    pub fn cancel(&self, ticket: &Ticket) -> bool {
        if !ticket.enqueued {
            return false;
        }
        let removed = self.state.lock().tickets.remove(&ticket.id).is_some();
        if removed {
            self.count.fetch_sub(1, Ordering::AcqRel);
            self.stats.record_cancelled();
        }
        trace!(ticket = ticket.id, removed, "ticket cancel");
        removed
    }

    /// Close the registry and resolve every waiter to `Outcome::Closed`
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        let (closed, removed) = {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            self.closed.store(true, Ordering::Release);
            state.resolve(usize::MAX, Outcome::Closed)
        };
        self.count.fetch_sub(removed, Ordering::AcqRel);
        self.stats.record_closed(closed);
        // Let a blocked notifier notice the close promptly
        let _ = self.doorbell_tx.try_send(());

        debug!(waiters = closed, "registry closed");
        true
    }

    /// Rung after every successful registration and on close
    #[inline]
    pub(crate) fn doorbell(&self) -> &Receiver<()> {
        &self.doorbell_rx
    }

    #[inline]
    pub(crate) fn stats_counters(&self) -> &StatCounters {
        &self.stats
    }

    pub fn stats(&self) -> CondStats {
        self.stats.snapshot()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
