// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![cfg(not(loom))]

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use skinny_mutex::{Error, Mutex, MutexGuard, RawMutex};

fn delay() {
    thread::sleep(Duration::from_millis(1));
}

/// Runs `test` twice: once on a fresh handle, and once on a handle whose
/// out-of-line state is pinned by a thread parked in a condition wait, so
/// the whole run goes through the fat paths. Either way the handle must be
/// back to its one-word idle form at the end.
fn do_test(test: fn(&RawMutex)) {
    let m = RawMutex::new();
    test(&m);
    assert!(m.destroy().is_ok());

    let m = Arc::new(RawMutex::new());
    let cond = Arc::new(Condvar::new());
    let phase = Arc::new(AtomicUsize::new(0));

    let waiter = {
        let (m, cond, phase) = (Arc::clone(&m), Arc::clone(&cond), Arc::clone(&phase));
        thread::spawn(move || {
            m.lock().unwrap();
            phase.store(1, Ordering::SeqCst);
            cond.notify_all();
            while phase.load(Ordering::SeqCst) != 2 {
                m.wait(&cond).unwrap();
            }
            m.unlock().unwrap();
        })
    };

    m.lock().unwrap();
    while phase.load(Ordering::SeqCst) != 1 {
        m.wait(&cond).unwrap();
    }
    m.unlock().unwrap();

    test(&m);

    m.lock().unwrap();
    phase.store(2, Ordering::SeqCst);
    cond.notify_all();
    m.unlock().unwrap();

    waiter.join().unwrap();
    assert!(m.destroy().is_ok());
}

#[test]
fn static_mutex() {
    static MUTEX: RawMutex = RawMutex::new();

    MUTEX.lock().unwrap();
    MUTEX.unlock().unwrap();
    MUTEX.destroy().unwrap();
}

fn lock_unlock(m: &RawMutex) {
    m.lock().unwrap();
    m.unlock().unwrap();
}

#[test]
fn test_lock_unlock() {
    do_test(lock_unlock);
}

fn contention(m: &RawMutex) {
    let held = AtomicBool::new(false);
    let count = AtomicU32::new(0);

    m.lock().unwrap();
    thread::scope(|s| {
        for _ in 0..10 {
            s.spawn(|| {
                m.lock().unwrap();
                assert!(!held.swap(true, Ordering::SeqCst));
                delay();
                held.store(false, Ordering::SeqCst);
                count.fetch_add(1, Ordering::SeqCst);
                m.unlock().unwrap();
            });
        }
        m.unlock().unwrap();
    });

    m.lock().unwrap();
    assert!(!held.load(Ordering::SeqCst));
    assert_eq!(count.load(Ordering::SeqCst), 10);
    m.unlock().unwrap();
}

#[test]
fn test_contention() {
    do_test(contention);
}

fn try_lock_busy(m: &RawMutex) {
    m.try_lock().unwrap();

    thread::scope(|s| {
        s.spawn(|| assert_eq!(m.try_lock(), Err(Error::Busy)));
    });

    // Again, with a blocked contender so the handle is promoted.
    thread::scope(|s| {
        let contender = s.spawn(|| {
            m.lock().unwrap();
            delay();
            delay();
            m.unlock().unwrap();
        });
        delay();
        s.spawn(|| assert_eq!(m.try_lock(), Err(Error::Busy)))
            .join()
            .unwrap();
        m.unlock().unwrap();
        contender.join().unwrap();
    });
}

#[test]
fn test_try_lock() {
    do_test(try_lock_busy);
}

fn cond_wait(m: &RawMutex) {
    let cond = Condvar::new();
    let flag = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            m.lock().unwrap();
            while !flag.load(Ordering::SeqCst) {
                m.wait(&cond).unwrap();
            }
            m.unlock().unwrap();
        });

        delay();
        m.lock().unwrap();
        flag.store(true, Ordering::SeqCst);
        cond.notify_one();
        m.unlock().unwrap();
    });
}

#[test]
fn test_cond_wait() {
    do_test(cond_wait);
}

fn cond_timedwait_expires(m: &RawMutex) {
    let cond = Condvar::new();

    m.lock().unwrap();
    assert_eq!(
        m.wait_timeout(&cond, Duration::from_millis(1)),
        Err(Error::TimedOut)
    );
    // The mutex is re-acquired on expiry.
    assert_eq!(m.try_lock(), Err(Error::Busy));
    assert_eq!(
        m.wait_deadline(&cond, Instant::now() + Duration::from_millis(1)),
        Err(Error::TimedOut)
    );
    m.unlock().unwrap();
}

#[test]
fn test_cond_timedwait() {
    do_test(cond_timedwait_expires);
}

fn transfer_to_free(m: &RawMutex) {
    let dst = RawMutex::new();

    m.lock().unwrap();
    m.transfer(&dst).unwrap();
    // The source is free again, the destination is ours.
    m.lock().unwrap();
    m.unlock().unwrap();
    dst.unlock().unwrap();
    assert!(dst.destroy().is_ok());
}

#[test]
fn test_transfer() {
    do_test(transfer_to_free);
}

fn transfer_vetoed(m: &RawMutex) {
    let src = RawMutex::new();

    m.lock().unwrap();
    thread::scope(|s| {
        let transferrer = s.spawn(|| {
            src.lock().unwrap();
            assert_eq!(src.transfer(m), Err(Error::Vetoed));
            // Still holding the source after the veto.
            src.unlock().unwrap();
        });
        // Keep vetoing until the transferrer has observed one; the
        // destination stays held the whole time, so a veto is the only way
        // out of the transfer.
        while !transferrer.is_finished() {
            m.veto_transfer().unwrap();
            delay();
        }
        transferrer.join().unwrap();
    });
    m.unlock().unwrap();
    assert!(src.destroy().is_ok());
}

#[test]
fn test_transfer_veto() {
    do_test(transfer_vetoed);
}

fn many_waiters(m: &RawMutex) {
    let count = AtomicU32::new(0);

    m.lock().unwrap();
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                m.lock().unwrap();
                count.fetch_add(1, Ordering::SeqCst);
                m.unlock().unwrap();
            });
        }
        delay();
        m.unlock().unwrap();
    });
    assert_eq!(count.load(Ordering::SeqCst), 8);
}

#[test]
fn test_many_waiters() {
    do_test(many_waiters);
}

/// A handle that sees contention only in bursts must shed its out-of-line
/// state at every quiescent point.
#[test]
fn repeated_promotion_returns_to_one_word() {
    let m = RawMutex::new();

    for _ in 0..50 {
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10 {
                        m.lock().unwrap();
                        m.unlock().unwrap();
                    }
                });
            }
        });
        assert!(m.destroy().is_ok());
    }
}

/// A parked condition waiter keeps the out-of-line state alive while other
/// threads churn the lock.
#[test]
fn pinned_waiter_survives_lock_churn() {
    do_test(|m| {
        for _ in 0..100 {
            m.lock().unwrap();
            m.unlock().unwrap();
        }
    });
}

#[test]
fn randomized_stress() {
    let m = Mutex::new(0_u64);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut rng = rand::rng();
                for _ in 0..100 {
                    *m.lock().unwrap() += 1;
                    if rng.random_range(0..4) == 0 {
                        thread::sleep(Duration::from_micros(rng.random_range(0..200)));
                    }
                }
            });
        }
    });

    assert_eq!(m.into_inner(), 400);
}

#[test]
fn guard_transfer_handoff() {
    let a = Mutex::new("a");
    let b = Mutex::new("b");

    let guard = a.lock().unwrap();
    let guard = MutexGuard::transfer(guard, &b).unwrap();
    assert_eq!(*guard, "b");
    assert_eq!(*a.try_lock().unwrap(), "a");
    drop(guard);
}

#[test]
fn typed_condvar_roundtrip() {
    let pair = Arc::new((Mutex::new(0_u32), skinny_mutex::Condvar::new()));

    let child = {
        let pair = Arc::clone(&pair);
        thread::spawn(move || {
            let (mutex, cond) = &*pair;
            delay();
            let mut value = mutex.lock().unwrap();
            *value = 1;
            cond.notify_one();
        })
    };

    let (mutex, cond) = &*pair;
    let mut value = mutex.lock().unwrap();
    while *value == 0 {
        value = cond.wait(value).unwrap();
    }
    assert_eq!(*value, 1);
    drop(value);

    child.join().unwrap();
}
