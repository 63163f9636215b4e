/*!
 * Lock Capability Traits
 *
 * Type-state markers for the two ways a condition variable can release and
 * reacquire the caller's lock, and the `Relock` trait that guards implement
 * to take part.
 *
 * # Design: Guards as Capabilities
 *
 * A waiter proves it holds the external lock by handing over its guard.
 * The guard is only borrowed; the lock itself stays owned by the caller.
 * `Relock::relock` releases the lock, runs the blocking closure and
 * reacquires the lock before returning, including when the closure unwinds.
 */

use parking_lot::lock_api::{
    GetThreadId, MutexGuard, RawMutex, RawRwLock, RawRwLockUpgrade, ReentrantMutexGuard,
    RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard,
};

/// Lock mode marker trait
pub trait LockMode: Send + Sync + 'static {
    /// Mode name for diagnostics
    const NAME: &'static str;
}

/// Type marker for exclusive (`lock`/`unlock`) waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Exclusive;
impl LockMode for Exclusive {
    const NAME: &'static str = "exclusive";
}

/// Type marker for shared-read (`read`/`unlock_shared`) waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SharedRead;
impl LockMode for SharedRead {
    const NAME: &'static str = "shared_read";
}

/// A held lock that can be temporarily given up
///
/// # Contract
///
/// Implementations must release the lock exactly once before calling `f`
/// and acquire it exactly once before returning, on every exit path
/// including unwinding out of `f`.
pub trait Relock<M: LockMode> {
    /// Release the lock, run `f`, then reacquire the lock
    fn relock<U, F>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U;
}

impl<'a, R: RawMutex + 'a, T: ?Sized + 'a> Relock<Exclusive> for MutexGuard<'a, R, T> {
    #[inline]
    fn relock<U, F>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        MutexGuard::unlocked(self, f)
    }
}

impl<'a, R: RawMutex + 'a, G: GetThreadId + 'a, T: ?Sized + 'a> Relock<Exclusive>
    for ReentrantMutexGuard<'a, R, G, T>
{
    #[inline]
    fn relock<U, F>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        ReentrantMutexGuard::unlocked(self, f)
    }
}

impl<'a, R: RawRwLock + 'a, T: ?Sized + 'a> Relock<Exclusive> for RwLockWriteGuard<'a, R, T> {
    #[inline]
    fn relock<U, F>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        RwLockWriteGuard::unlocked(self, f)
    }
}

impl<'a, R: RawRwLock + 'a, T: ?Sized + 'a> Relock<SharedRead> for RwLockReadGuard<'a, R, T> {
    #[inline]
    fn relock<U, F>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        RwLockReadGuard::unlocked(self, f)
    }
}

impl<'a, R: RawRwLockUpgrade + 'a, T: ?Sized + 'a> Relock<SharedRead>
    for RwLockUpgradableReadGuard<'a, R, T>
{
    #[inline]
    fn relock<U, F>(&mut self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        RwLockUpgradableReadGuard::unlocked(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Mutex, RwLock};

    #[test]
    fn test_mutex_guard_released_inside_relock() {
        let mutex = Mutex::new(1);
        let mut guard = mutex.lock();

        let was_free = Relock::<Exclusive>::relock(&mut guard, || mutex.try_lock().is_some());
        assert!(was_free);

        // Reacquired on return
        assert!(mutex.try_lock().is_none());
        assert_eq!(*guard, 1);
    }

    #[test]
    fn test_read_guard_allows_writer_inside_relock() {
        let lock = RwLock::new(0);
        let mut guard = lock.read();

        Relock::<SharedRead>::relock(&mut guard, || {
            *lock.write() = 7;
        });

        assert_eq!(*guard, 7);
        assert!(lock.try_write().is_none());
    }

    #[test]
    fn test_lock_reacquired_after_panic() {
        let mutex = Mutex::new(());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = mutex.lock();
            Relock::<Exclusive>::relock(&mut guard, || panic!("boom"));
        }));
        assert!(result.is_err());
        // Guard was dropped while unwinding, so the mutex is free again
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(Exclusive::NAME, "exclusive");
        assert_eq!(SharedRead::NAME, "shared_read");
    }
}
