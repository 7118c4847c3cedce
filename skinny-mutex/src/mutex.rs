// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};

use crate::error::Error;
use crate::loom::cell::UnsafeCell;
use crate::loom::loom_const_fn;
use crate::raw::RawMutex;

/// A mutual exclusion primitive protecting `T` that costs one word of
/// memory while it is uncontended.
///
/// The lock state lives in a single pointer-sized word next to the data.
/// Out-of-line state is allocated the first time a thread has to block and
/// freed again once contention subsides, so a large collection of mostly
/// idle mutexes stays small.
///
/// The data can only be accessed through the RAII guards returned from
/// [`lock`] and [`try_lock`], which guarantees the data is only ever
/// accessed while the mutex is held.
///
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
pub struct Mutex<T: ?Sized> {
    pub(crate) raw: RawMutex,
    data: UnsafeCell<T>,
}

/// An RAII implementation of a "scoped lock" of a mutex. When this structure
/// is dropped (falls out of scope), the lock will be unlocked.
///
/// The data protected by the mutex can be accessed through this guard via
/// its `Deref` and `DerefMut` implementations.
#[clippy::has_significant_drop]
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    marker: PhantomData<&'a mut T>,
}

/// Error returned by [`MutexGuard::transfer`]. The source mutex is still
/// held, and its guard rides along so the caller keeps using it.
pub struct TransferError<'a, T: ?Sized> {
    guard: MutexGuard<'a, T>,
    kind: Error,
}

// Safety: protecting `T` with a lock adds no thread affinity of its own.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
// Safety: the lock protocol guarantees at most one thread reaches the data
// at a time.
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

// === impl Mutex ===

impl<T> Mutex<T> {
    loom_const_fn! {
        /// Creates a new, unlocked mutex protecting `val`.
        pub const fn new(val: T) -> Mutex<T> {
            Mutex {
                raw: RawMutex::new(),
                data: UnsafeCell::new(val),
            }
        }
    }

    /// Consumes this mutex, returning the underlying data.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Creates a new `MutexGuard` without checking if the mutex is locked.
    ///
    /// # Safety
    ///
    /// This method must only be called if the thread logically holds the
    /// lock and no guard for it is live.
    #[inline]
    pub(crate) unsafe fn make_guard_unchecked(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            mutex: self,
            marker: PhantomData,
        }
    }

    /// Acquires the mutex, blocking the current thread until it is able to
    /// do so, and returns an RAII guard scoping the lock.
    ///
    /// Locking a mutex in the thread which already holds it deadlocks.
    ///
    /// # Errors
    ///
    /// [`Error::AllocFailed`] if the out-of-line state needed to block
    /// could not be allocated.
    #[inline]
    pub fn lock(&self) -> Result<MutexGuard<'_, T>, Error> {
        self.raw.lock()?;
        // Safety: the lock was just acquired.
        Ok(unsafe { self.make_guard_unchecked() })
    }

    /// Attempts to acquire this lock without blocking.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if the mutex is held by another thread, or
    /// [`Error::AllocFailed`].
    #[inline]
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>, Error> {
        self.raw.try_lock()?;
        // Safety: the lock was just acquired.
        Ok(unsafe { self.make_guard_unchecked() })
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs
    /// to take place---the mutable borrow statically guarantees no locks
    /// exist.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        // Safety: we hold a mutable reference to the mutex, so no guard can
        // be live.
        self.data.with_mut(|data| unsafe { &mut *data })
    }
}

impl<T: Default> Default for Mutex<T> {
    #[inline]
    fn default() -> Mutex<T> {
        Mutex::new(T::default())
    }
}

impl<T> From<T> for Mutex<T> {
    #[inline]
    fn from(t: T) -> Mutex<T> {
        Mutex::new(t)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Ok(guard) => f.debug_struct("Mutex").field("data", &&*guard).finish(),
            Err(_) => {
                struct LockedPlaceholder;
                impl fmt::Debug for LockedPlaceholder {
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str("<locked>")
                    }
                }

                f.debug_struct("Mutex")
                    .field("data", &LockedPlaceholder)
                    .finish()
            }
        }
    }
}

// === impl MutexGuard ===

// Safety: the guard only hands out references derived from `&Mutex<T>`.
unsafe impl<'a, T: ?Sized + Sync + 'a> Sync for MutexGuard<'a, T> {}

impl<'a, T: ?Sized + 'a> MutexGuard<'a, T> {
    /// Returns a reference to the original `Mutex` object.
    pub fn mutex(s: &Self) -> &'a Mutex<T> {
        s.mutex
    }

    /// Atomically trades the lock `s` scopes for the lock on `target`:
    /// blocks until `target` can be taken, takes it, and only then releases
    /// the source, so no other thread can ever observe this thread holding
    /// neither.
    ///
    /// # Errors
    ///
    /// [`Error::Vetoed`] if [`veto_transfer`] fired on `target` while this
    /// thread waited, and [`Error::AllocFailed`] if the out-of-line state
    /// could not be allocated. In both cases the source lock is still held
    /// and its guard is handed back inside the [`TransferError`].
    ///
    /// [`Error::Vetoed`]: crate::Error::Vetoed
    /// [`Error::AllocFailed`]: crate::Error::AllocFailed
    /// [`veto_transfer`]: Self::veto_transfer
    pub fn transfer<'b, U: ?Sized>(
        s: Self,
        target: &'b Mutex<U>,
    ) -> Result<MutexGuard<'b, U>, TransferError<'a, T>> {
        let source = s.mutex;
        mem::forget(s);
        match source.raw.transfer(&target.raw) {
            // Safety: the transfer succeeded, so this thread holds `target`.
            Ok(()) => Ok(unsafe { target.make_guard_unchecked() }),
            Err(kind) => Err(TransferError {
                // Safety: on error the source mutex is still held by this
                // thread.
                guard: unsafe { source.make_guard_unchecked() },
                kind,
            }),
        }
    }

    /// Aborts every [`transfer`] currently waiting to take this mutex; each
    /// returns [`Error::Vetoed`] to its caller.
    ///
    /// # Errors
    ///
    /// [`Error::AllocFailed`] if inspecting a contended handle required an
    /// allocation that failed.
    ///
    /// [`transfer`]: Self::transfer
    /// [`Error::Vetoed`]: crate::Error::Vetoed
    /// [`Error::AllocFailed`]: crate::Error::AllocFailed
    pub fn veto_transfer(s: &Self) -> Result<(), Error> {
        s.mutex.raw.veto_transfer()
    }
}

impl<'a, T: ?Sized + 'a> Deref for MutexGuard<'a, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        // Safety: the guard scopes a held lock, so access is exclusive.
        self.mutex.data.with(|data| unsafe { &*data })
    }
}

impl<'a, T: ?Sized + 'a> DerefMut for MutexGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard scopes a held lock, so access is exclusive.
        self.mutex.data.with_mut(|data| unsafe { &mut *data })
    }
}

impl<'a, T: ?Sized + 'a> Drop for MutexGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        let res = self.mutex.raw.unlock();
        debug_assert!(res.is_ok(), "failed to unlock mutex: {res:?}");
    }
}

impl<'a, T: fmt::Debug + ?Sized + 'a> fmt::Debug for MutexGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T: fmt::Display + ?Sized + 'a> fmt::Display for MutexGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

// === impl TransferError ===

impl<'a, T: ?Sized> TransferError<'a, T> {
    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> Error {
        self.kind
    }

    /// Recovers the guard for the still-held source mutex.
    #[must_use]
    pub fn into_guard(self) -> MutexGuard<'a, T> {
        self.guard
    }
}

impl<T: ?Sized> fmt::Debug for TransferError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> fmt::Display for TransferError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<T: ?Sized> core::error::Error for TransferError<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom;
    use crate::loom::sync::Arc;
    use crate::loom::thread;

    #[derive(Eq, PartialEq, Debug)]
    struct NonCopy(i32);

    #[test]
    fn smoke() {
        loom::model(|| {
            let m = Mutex::new(());
            drop(m.lock().unwrap());
            drop(m.lock().unwrap());
        });
    }

    #[test]
    fn try_lock() {
        loom::model(|| {
            let mutex = Mutex::<_>::new(42);

            // First lock succeeds
            let a = mutex.try_lock();
            assert_eq!(a.as_ref().map(|r| **r), Ok(42));

            // Additional lock fails
            let b = mutex.try_lock();
            assert_eq!(b.map(|_| ()), Err(Error::Busy));

            // After dropping lock, it succeeds again
            drop(a);
            let c = mutex.try_lock();
            assert_eq!(c.as_ref().map(|r| **r), Ok(42));
        });
    }

    #[test]
    fn test_into_inner() {
        loom::model(|| {
            let m = Mutex::<_>::new(NonCopy(10));
            assert_eq!(m.into_inner(), NonCopy(10));
        });
    }

    #[test]
    fn test_get_mut() {
        loom::model(|| {
            let mut m = Mutex::new(NonCopy(10));
            *m.get_mut() = NonCopy(20);
            assert_eq!(m.into_inner(), NonCopy(20));
        });
    }

    #[test]
    fn guard_transfer_moves_the_lock() {
        loom::model(|| {
            let a = Mutex::new(1);
            let b = Mutex::new(2);

            let guard = a.lock().unwrap();
            let guard = MutexGuard::transfer(guard, &b).unwrap();
            assert_eq!(*guard, 2);
            // `a` is free again.
            assert_eq!(*a.try_lock().unwrap(), 1);
            drop(guard);
        });
    }

    #[test]
    fn basic_multi_threaded() {
        loom::model(|| {
            fn incr(lock: &Arc<Mutex<i32>>) -> thread::JoinHandle<()> {
                let lock = Arc::clone(lock);
                thread::spawn(move || {
                    let mut lock = lock.lock().unwrap();
                    *lock += 1;
                })
            }

            let lock = Arc::new(Mutex::new(0));
            let t1 = incr(&lock);
            let t2 = incr(&lock);

            t1.join().unwrap();
            t2.join().unwrap();

            assert_eq!(*lock.lock().unwrap(), 2);
        });
    }
}
