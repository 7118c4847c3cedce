// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::mem;
#[cfg(not(loom))]
use core::time::Duration;

use crate::error::Error;
use crate::loom::loom_const_fn;
use crate::loom::sync;
use crate::mutex::MutexGuard;

/// A condition variable usable with [`Mutex`].
///
/// [`Mutex`]: crate::Mutex
///
/// Parking releases the mutex and re-acquires it before returning, with the
/// usual condition variable contract: wakeups may be spurious, so callers
/// check their predicate in a loop.
///
/// While any thread is parked here, the associated mutex keeps its
/// out-of-line state alive; the handle demotes back to one word once the
/// last waiter has left.
pub struct Condvar {
    inner: sync::Condvar,
}

/// Error returned by the [`Condvar`] wait operations. The mutex is still
/// held, and its guard rides along so the caller keeps the lock.
pub struct WaitError<'a, T: ?Sized> {
    guard: MutexGuard<'a, T>,
    kind: Error,
}

/// Whether a [`Condvar::wait_timeout`] returned because its timeout
/// elapsed.
#[cfg(not(loom))]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WaitTimeoutResult(bool);

#[cfg(not(loom))]
impl WaitTimeoutResult {
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.0
    }
}

// === impl Condvar ===

impl Condvar {
    loom_const_fn! {
        /// Creates a new condition variable.
        #[must_use]
        pub const fn new() -> Condvar {
            Condvar {
                inner: sync::Condvar::new(),
            }
        }
    }

    /// Wakes up one thread parked on this condition variable, if any.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes up all threads parked on this condition variable.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }

    /// Releases the mutex scoped by `guard` and parks until notified, then
    /// re-acquires the mutex.
    ///
    /// # Errors
    ///
    /// [`Error::AllocFailed`] if pinning the handle failed. The mutex is
    /// still held; the guard comes back inside the [`WaitError`].
    ///
    /// [`Error::AllocFailed`]: crate::Error::AllocFailed
    pub fn wait<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
    ) -> Result<MutexGuard<'a, T>, WaitError<'a, T>> {
        let mutex = MutexGuard::mutex(&guard);
        mem::forget(guard);
        match mutex.raw.wait(&self.inner) {
            // Safety: the mutex is re-acquired on every Ok return.
            Ok(()) => Ok(unsafe { mutex.make_guard_unchecked() }),
            Err(kind) => Err(WaitError {
                // Safety: on error the mutex was never released.
                guard: unsafe { mutex.make_guard_unchecked() },
                kind,
            }),
        }
    }

    /// Like [`wait`], but gives up once `timeout` has elapsed. The mutex is
    /// re-acquired in the timeout case too, reported through the
    /// [`WaitTimeoutResult`].
    ///
    /// # Errors
    ///
    /// See [`wait`].
    ///
    /// [`wait`]: Self::wait
    #[cfg(not(loom))]
    pub fn wait_timeout<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> Result<(MutexGuard<'a, T>, WaitTimeoutResult), WaitError<'a, T>> {
        let mutex = MutexGuard::mutex(&guard);
        mem::forget(guard);
        match mutex.raw.wait_timeout(&self.inner, timeout) {
            // Safety: the mutex is re-acquired on Ok and timeout returns.
            Ok(()) => Ok((unsafe { mutex.make_guard_unchecked() }, WaitTimeoutResult(false))),
            Err(Error::TimedOut) => {
                // Safety: as above.
                Ok((unsafe { mutex.make_guard_unchecked() }, WaitTimeoutResult(true)))
            }
            Err(kind) => Err(WaitError {
                // Safety: on any other error the mutex was never released.
                guard: unsafe { mutex.make_guard_unchecked() },
                kind,
            }),
        }
    }
}

impl Default for Condvar {
    fn default() -> Condvar {
        Condvar::new()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

// === impl WaitError ===

impl<'a, T: ?Sized> WaitError<'a, T> {
    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> Error {
        self.kind
    }

    /// Recovers the guard for the still-held mutex.
    #[must_use]
    pub fn into_guard(self) -> MutexGuard<'a, T> {
        self.guard
    }
}

impl<T: ?Sized> fmt::Debug for WaitError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> fmt::Display for WaitError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<T: ?Sized> core::error::Error for WaitError<'_, T> {}
