/*!
 * Signal Coordinator
 *
 * Exact-N signaling, broadcast and close layered over the waiter registry.
 *
 * # The Registration Race
 *
 * A waiter announces itself in the registry count before its ticket is
 * actually enqueued. A notifier can therefore see `count() > 0` and still
 * wake nobody. One-shot "count then wake" under-wakes in that window, so
 * `signal` keeps retrying while the count says someone is there, stops
 * looping at the first attempt that wakes anyone, and makes one final
 * attempt for whatever is still owed.
 */

use super::config::CondConfig;
use super::context::Context;
use super::registry::{Registry, Ticket};
use super::stats::CondStats;
use crate::core::errors::{CondError, CondResult};
use crate::monitoring::BlockingSpan;
use flume::Selector;
use std::thread;
use std::time::Instant;
use tracing::{debug, trace};

/// Wake coordinator shared by every clone of a condition variable
#[derive(Debug)]
pub struct Signaller {
    registry: Registry,
    config: CondConfig,
}

impl Signaller {
    pub fn new(config: CondConfig) -> Self {
        Self {
            registry: Registry::new(),
            config,
        }
    }

    #[inline]
    pub fn register(&self) -> Ticket {
        self.registry.register()
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn config(&self) -> &CondConfig {
        &self.config
    }

    /// Wake up to `n` waiters and report how many were woken
    ///
    /// `n == 0` wakes every waiter and reports 0, like [`broadcast`](Self::broadcast).
    /// Never blocks.
    pub fn signal(&self, n: usize) -> usize {
        if n == 0 {
            self.registry.broadcast();
            return 0;
        }

        let mut remaining = n;
        let mut woken = 0;
        let mut attempts: u32 = 0;

        while self.registry.count() > 0 {
            let x = self.registry.wake_n(remaining);
            woken += x;
            remaining -= x;
            if x > 0 {
                break;
            }
            attempts += 1;
            self.backoff(attempts);
        }

        if attempts > 0 {
            trace!(attempts, woken, "signal retried around in-flight registration");
        }

        // One last attempt, never a loop and never a broadcast
        if remaining > 0 {
            woken += self.registry.wake_n(remaining);
        }
        woken
    }

    /// Wake exactly `n` waiters, blocking until they have registered
    ///
    /// Returns early without error if the registry is closed, and with
    /// [`CondError::SignalInterrupted`] (carrying the partial count) if `ctx`
    /// is cancelled first. `n == 0` broadcasts and returns `Ok(0)` whatever
    /// the state of `ctx`.
    pub fn signal_with_context(&self, ctx: &Context, n: usize) -> CondResult<usize> {
        if n == 0 {
            self.registry.broadcast();
            return Ok(0);
        }

        let span = BlockingSpan::new("signal_with_context", n);
        let _entered = span.enter();

        let result = self.signal_until(ctx, n);
        match &result {
            Ok(woken) => {
                span.record_woken(*woken);
                span.record_result(if *woken == n { "satisfied" } else { "closed" });
            }
            Err(err) => {
                span.record_woken(err.woken());
                span.record_result("interrupted");
            }
        }
        result
    }

    fn signal_until(&self, ctx: &Context, n: usize) -> CondResult<usize> {
        let mut woken = 0;
        let mut attempts: u32 = 0;

        loop {
            woken += self.registry.wake_n(n - woken);
            if woken == n {
                return Ok(woken);
            }

            if self.registry.is_closed() {
                debug!(woken, requested = n, "signal stopped by close");
                return Ok(woken);
            }

            if let Some(cause) = ctx.err() {
                debug!(woken, requested = n, %cause, "signal interrupted");
                return Err(CondError::SignalInterrupted { woken, cause });
            }

            if self.registry.count() > 0 {
                // Someone is mid-registration; try again shortly
                attempts += 1;
                self.backoff(attempts);
                continue;
            }

            self.await_registration(ctx);
        }
    }

    /// Park until a waiter registers, the registry closes, `ctx` is
    /// cancelled, or the retry interval elapses
    fn await_registration(&self, ctx: &Context) {
        let mut deadline = Instant::now() + self.config.retry_interval();
        if let Some(ctx_deadline) = ctx.deadline() {
            deadline = deadline.min(ctx_deadline);
        }

        let _ = Selector::new()
            .recv(self.registry.doorbell(), |_| ())
            .recv(ctx.done(), |_| ())
            .wait_deadline(deadline);
    }

    #[inline]
    fn backoff(&self, attempts: u32) {
        self.registry.stats_counters().record_retry();
        if attempts % self.config.spin_yield_every() == 0 {
            thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }

    #[inline]
    pub fn broadcast(&self) {
        self.registry.broadcast();
    }

    #[inline]
    pub fn close(&self) -> bool {
        self.registry.close()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    #[inline]
    pub fn wait_count(&self) -> usize {
        self.registry.count()
    }

    #[inline]
    pub fn stats(&self) -> CondStats {
        self.registry.stats()
    }
}

impl Default for Signaller {
    fn default() -> Self {
        Self::new(CondConfig::default())
    }
}
