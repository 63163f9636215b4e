/*!
 * Condition Variable Configuration
 *
 * Tuning knobs for the signal retry protocol
 */

use std::time::Duration;

/// Condition variable configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondConfig {
    /// How long a blocking signal sleeps when no waiter is registered
    /// before it looks again (a registration doorbell cuts this short)
    pub retry_interval: Duration,
    /// Yield the thread every this many empty wake attempts while a
    /// registration is in flight
    pub spin_yield_every: u32,
}

impl Default for CondConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(1),
            spin_yield_every: 10,
        }
    }
}

impl CondConfig {
    /// Configuration for notifiers that expect waiters to show up quickly
    pub const fn low_latency() -> Self {
        Self {
            retry_interval: Duration::from_micros(100),
            spin_yield_every: 50,
        }
    }

    /// Configuration for notifiers that may block for a long time
    pub const fn long_wait() -> Self {
        Self {
            retry_interval: Duration::from_millis(10),
            spin_yield_every: 1,
        }
    }

    /// Retry interval, clamped so a zero value cannot degrade into a busy loop
    #[inline]
    pub(crate) fn retry_interval(&self) -> Duration {
        self.retry_interval.max(Duration::from_micros(10))
    }

    /// Yield cadence, clamped to at least one attempt
    #[inline]
    pub(crate) fn spin_yield_every(&self) -> u32 {
        self.spin_yield_every.max(1)
    }
}
