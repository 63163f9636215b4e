/*!
 * Condition Variable Statistics
 * Monotone counters kept with relaxed atomics
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a condition variable's lifetime counters
///
/// Counters are read independently, so a snapshot taken while other
/// threads are active is only approximately consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondStats {
    /// Tickets that were enqueued (pre-closed tickets are not counted)
    pub registered: u64,
    /// Tickets resolved by signal or broadcast
    pub woken: u64,
    /// Tickets resolved by close
    pub closed: u64,
    /// Tickets withdrawn by a winning cancellation
    pub cancelled: u64,
    /// Empty wake attempts made while a registration was in flight
    pub signal_retries: u64,
}

impl CondStats {
    /// Tickets still waiting at snapshot time
    pub fn pending(&self) -> u64 {
        self.registered
            .saturating_sub(self.woken + self.closed + self.cancelled)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    registered: AtomicU64,
    woken: AtomicU64,
    closed: AtomicU64,
    cancelled: AtomicU64,
    signal_retries: AtomicU64,
}

impl StatCounters {
    #[inline]
    pub(crate) fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_woken(&self, n: usize) {
        if n > 0 {
            self.woken.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_closed(&self, n: usize) {
        if n > 0 {
            self.closed.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_retry(&self) {
        self.signal_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CondStats {
        CondStats {
            registered: self.registered.load(Ordering::Relaxed),
            woken: self.woken.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            signal_retries: self.signal_retries.load(Ordering::Relaxed),
        }
    }
}
