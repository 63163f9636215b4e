/*!
 * Close and Cancellation Integration Tests
 *
 * Close-safety, context-cancelled waits, and blocking signals
 */

use parking_lot::{Mutex, RwLock};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use wake_cond::{Cond, CondError, CondVar, Context, ContextError, LockMode, RwCond};

fn wait_for_waiters<M: LockMode>(cond: &CondVar<M>, n: usize) {
    let start = Instant::now();
    // Pending counts only tickets that are actually enqueued
    while cond.stats().pending() < n as u64 {
        assert!(start.elapsed() < Duration::from_secs(5), "waiters never registered");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_close_releases_waiter_and_later_waits() {
    let lock = Arc::new(Mutex::new(()));
    let cond = Cond::new();

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        let mut guard = l.lock();
        c.wait(&mut guard)
    });

    wait_for_waiters(&cond, 1);
    assert!(cond.close());
    assert!(!waiter.join().unwrap());

    // A second wait after close returns immediately
    let start = Instant::now();
    let mut guard = lock.lock();
    assert!(!cond.wait(&mut guard));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_concurrent_close_exactly_one_winner() {
    let cond = Cond::new();
    let barrier = Arc::new(Barrier::new(8));
    let winners = Arc::new(AtomicUsize::new(0));

    let closers: Vec<_> = (0..8)
        .map(|_| {
            let cond = cond.clone();
            let barrier = barrier.clone();
            let winners = winners.clone();
            thread::spawn(move || {
                barrier.wait();
                if cond.close() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for closer in closers {
        closer.join().unwrap();
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(cond.is_closed());
    assert!(!cond.close());
}

#[test]
fn test_everything_is_safe_after_close() {
    let lock = Mutex::new(());
    let rw = RwLock::new(());
    let cond = Cond::new();
    let rw_cond = RwCond::new();
    cond.close();
    rw_cond.close();

    let (ctx, handle) = Context::with_cancel(&Context::background());

    assert_eq!(cond.signal(3), 0);
    assert_eq!(cond.signal(0), 0);
    cond.broadcast();
    assert_eq!(cond.wait_count(), 0);
    assert_eq!(cond.signal_with_context(&ctx, 2), Ok(0));

    let mut guard = lock.lock();
    assert_eq!(cond.wait_with_context(&mut guard, &ctx), Ok(false));
    assert!(!cond.wait_while(&mut guard, |_| true));
    drop(guard);

    let mut read = rw.read();
    assert!(!rw_cond.wait(&mut read));
    drop(read);

    handle.cancel();
    assert_eq!(cond.signal_with_context(&ctx, 2), Ok(0));
    assert!(cond.is_closed());
}

#[test]
fn test_close_releases_many_waiters_of_both_kinds() {
    let mutex = Arc::new(Mutex::new(()));
    let rw = Arc::new(RwLock::new(()));
    let cond = Cond::new();
    let rw_cond = RwCond::new();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let (m, c) = (mutex.clone(), cond.clone());
        handles.push(thread::spawn(move || {
            let mut guard = m.lock();
            c.wait(&mut guard)
        }));
        let (r, c) = (rw.clone(), rw_cond.clone());
        handles.push(thread::spawn(move || {
            let mut guard = r.read();
            c.wait(&mut guard)
        }));
    }

    wait_for_waiters(&cond, 4);
    wait_for_waiters(&rw_cond, 4);
    cond.close();
    rw_cond.close();

    for handle in handles {
        assert!(!handle.join().unwrap());
    }
    assert_eq!(cond.stats().closed, 4);
    assert_eq!(rw_cond.stats().closed, 4);
}

#[test]
fn test_wait_with_context_cancelled_after_registration() {
    let lock = Arc::new(Mutex::new(()));
    let cond = Cond::new();
    let (ctx, handle) = Context::with_cancel(&Context::background());

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        let mut guard = l.lock();
        let result = c.wait_with_context(&mut guard, &ctx);
        // Lock is held again whatever the outcome
        assert!(l.try_lock().is_none());
        result
    });

    wait_for_waiters(&cond, 1);
    handle.cancel();

    let result = waiter.join().unwrap();
    assert_eq!(result, Err(CondError::Interrupted(ContextError::Canceled)));
    // A later signal finds nobody
    assert_eq!(cond.signal(1), 0);
}

#[test]
fn test_wait_with_context_deadline() {
    let lock = Mutex::new(());
    let cond = Cond::new();
    let ctx = Context::with_timeout(&Context::background(), Duration::from_millis(25));

    let mut guard = lock.lock();
    let result = cond.wait_with_context(&mut guard, &ctx);
    assert_eq!(result, Err(CondError::Interrupted(ContextError::DeadlineExceeded)));
    assert_eq!(cond.wait_count(), 0);
}

#[test]
#[serial]
fn test_wake_and_cancel_race_never_double_counts() {
    let lock = Arc::new(Mutex::new(()));
    let cond = Cond::new();
    let rounds = 100;
    let mut reported_woken = 0;
    let mut reported_cancelled = 0;

    for _ in 0..rounds {
        let (ctx, handle) = Context::with_cancel(&Context::background());
        let (l, c) = (lock.clone(), cond.clone());
        let waiter = thread::spawn(move || {
            let mut guard = l.lock();
            c.wait_with_context(&mut guard, &ctx)
        });

        wait_for_waiters(&cond, 1);
        let canceller = thread::spawn(move || handle.cancel());
        let woken = cond.signal(1);
        canceller.join().unwrap();

        match waiter.join().unwrap() {
            Ok(true) => {
                assert_eq!(woken, 1);
                reported_woken += 1;
            }
            Err(CondError::Interrupted(ContextError::Canceled)) => {
                assert_eq!(woken, 0);
                reported_cancelled += 1;
            }
            other => panic!("unexpected wait result: {:?}", other),
        }
    }

    let stats = cond.stats();
    assert_eq!(reported_woken + reported_cancelled, rounds);
    assert_eq!(stats.woken, reported_woken as u64);
    assert_eq!(stats.cancelled, reported_cancelled as u64);
    assert_eq!(cond.wait_count(), 0);
}

#[test]
fn test_signal_with_context_cancelled_no_waiters_does_not_block() {
    let cond = Cond::new();
    let (ctx, handle) = Context::with_cancel(&Context::background());
    handle.cancel();

    let start = Instant::now();
    let err = cond.signal_with_context(&ctx, 3).unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(err.woken(), 0);
    assert_eq!(err.cause(), Some(ContextError::Canceled));
}

#[test]
fn test_signal_with_context_wakes_late_waiters() {
    let lock = Arc::new(Mutex::new(()));
    let cond = Cond::new();

    let waiters: Vec<_> = (0..3)
        .map(|i| {
            let (l, c) = (lock.clone(), cond.clone());
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20 * (i + 1)));
                let mut guard = l.lock();
                c.wait(&mut guard)
            })
        })
        .collect();

    assert_eq!(cond.signal_with_context(&Context::background(), 3), Ok(3));
    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
}

#[test]
fn test_signal_with_context_interrupted_reports_partial_count() {
    let lock = Arc::new(Mutex::new(()));
    let cond = Cond::new();

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        let mut guard = l.lock();
        c.wait(&mut guard)
    });
    wait_for_waiters(&cond, 1);

    let ctx = Context::with_timeout(&Context::background(), Duration::from_millis(30));
    let err = cond.signal_with_context(&ctx, 5).unwrap_err();
    assert_eq!(
        err,
        CondError::SignalInterrupted {
            woken: 1,
            cause: ContextError::DeadlineExceeded
        }
    );
    assert!(waiter.join().unwrap());
}

#[test]
fn test_signal_with_context_unblocked_by_close() {
    let cond = Cond::new();
    let c = cond.clone();

    let signaller = thread::spawn(move || c.signal_with_context(&Context::background(), 2));

    thread::sleep(Duration::from_millis(30));
    cond.close();
    assert_eq!(signaller.join().unwrap(), Ok(0));
}
