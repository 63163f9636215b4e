/*!
 * Cancellation Context
 *
 * Cancellation/deadline token consumed by `wait_with_context` and
 * `signal_with_context`.
 *
 * # Design
 *
 * Every context owns a `done` channel whose only sender is dropped on
 * cancellation. Blocking code selects on the disconnected receiver next to
 * whatever it is really waiting for, and on the context deadline. Deadline
 * expiry is observed lazily: there is no timer thread, `err()` notices that
 * the deadline passed and records `DeadlineExceeded` the first time it looks.
 *
 * Children register with their parent so that cancelling a parent cancels
 * every live descendant with the same reason.
 */

use crate::core::errors::ContextError;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

struct State {
    err: Option<ContextError>,
    /// Dropped on cancellation to disconnect `done`
    done_tx: Option<Sender<()>>,
    children: Vec<Weak<Inner>>,
}

struct Inner {
    state: Mutex<State>,
    done_rx: Receiver<()>,
    deadline: Option<Instant>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Arc<Self> {
        let (done_tx, done_rx) = flume::bounded(0);
        Arc::new(Self {
            state: Mutex::new(State {
                err: None,
                done_tx: Some(done_tx),
                children: Vec::new(),
            }),
            done_rx,
            deadline,
        })
    }

    /// Move to the terminal state; returns false if already terminal
    fn cancel(&self, reason: ContextError) -> bool {
        let children = {
            let mut state = self.state.lock();
            if state.err.is_some() {
                return false;
            }
            state.err = Some(reason);
            state.done_tx = None;
            std::mem::take(&mut state.children)
        };

        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason);
        }
        true
    }

    fn err(&self) -> Option<ContextError> {
        if let Some(err) = self.state.lock().err {
            return Some(err);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel(ContextError::DeadlineExceeded);
                self.state.lock().err
            }
            _ => None,
        }
    }
}

/// Cancellation token with an optional deadline
///
/// Cheap to clone; clones observe the same cancellation.
///
/// # Examples
///
/// ```
/// use wake_cond::Context;
/// use std::time::Duration;
///
/// let (ctx, handle) = Context::with_cancel(&Context::background());
/// assert!(ctx.err().is_none());
///
/// handle.cancel();
/// assert!(ctx.err().is_some());
///
/// let timed = Context::with_timeout(&ctx, Duration::from_secs(5));
/// assert!(timed.is_done()); // inherits the parent's cancellation
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Root context: never cancelled, no deadline
    pub fn background() -> Self {
        Self {
            inner: Inner::new(None),
        }
    }

    /// Child context plus the handle that cancels it
    pub fn with_cancel(parent: &Context) -> (Self, CancelHandle) {
        let ctx = parent.child(parent.deadline());
        let handle = CancelHandle {
            inner: Arc::clone(&ctx.inner),
        };
        (ctx, handle)
    }

    /// Child context that expires at `deadline` (or at the parent's earlier one)
    pub fn with_deadline(parent: &Context, deadline: Instant) -> Self {
        let deadline = match parent.deadline() {
            Some(inherited) => inherited.min(deadline),
            None => deadline,
        };
        parent.child(Some(deadline))
    }

    /// Child context that expires after `timeout`
    pub fn with_timeout(parent: &Context, timeout: Duration) -> Self {
        Self::with_deadline(parent, Instant::now() + timeout)
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        let child = Inner::new(deadline);

        let inherited = {
            let mut state = self.inner.state.lock();
            if state.err.is_none() {
                state.children.retain(|c| c.strong_count() > 0);
                state.children.push(Arc::downgrade(&child));
            }
            state.err
        };
        if let Some(reason) = inherited {
            child.cancel(reason);
        }

        Self { inner: child }
    }

    /// Terminal reason, once cancelled or past the deadline
    ///
    /// Once `Some`, the value never changes.
    pub fn err(&self) -> Option<ContextError> {
        self.inner.err()
    }

    /// Whether the context has reached its terminal state
    #[inline]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Deadline after which the context reports `DeadlineExceeded`
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Receiver that disconnects when the context is cancelled
    ///
    /// Deadline expiry does not disconnect it on its own; select with
    /// [`deadline`](Self::deadline) as the timeout.
    #[inline]
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.inner.state.lock().err)
            .finish()
    }
}

/// Cancels the context it was created with
///
/// Dropping the handle does not cancel.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    /// Cancel the context and all of its descendants
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        self.inner.cancel(ContextError::Canceled)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}
