// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The one-word mutex handle and its state protocol.
//!
//! A [`RawMutex`] is a single pointer-sized word. The uncontended cases are
//! simple: the word is null while the mutex is unheld and [`LOCKED`] (the
//! reserved address 1) while it is held, and a compare-and-swap moves
//! between the two.
//!
//! The first time a thread has to block (or park on a condition variable,
//! or wait in a transfer), the handle is *promoted*: a [`FatMutex`] is
//! allocated, carrying an ordinary blocking mutex and condition variable
//! plus the bookkeeping needed to tear everything back down, and the word
//! becomes a pointer to it. When the last reference drops, the word is
//! swapped back to null and the allocation is freed, so a mutex that sees
//! contention only in bursts repeatedly returns to its one-word form.
//!
//! Dereferencing the word is the dangerous part: between reading a
//! [`FatMutex`] pointer and locking it, another thread may free it. Instead
//! of hazard pointers (which need per-thread registries), each accessor
//! *pegs* the handle: it allocates a tiny [`Peg`] node pointing at the
//! value it observed and CASes the peg into the word. The fat state is only
//! freed when the word points directly at it, so an installed peg keeps the
//! whole chain behind it alive. Pegs form chains ending at the fat state:
//!
//! ```text
//! +--------+    +-------+    +-------+    +-----------+
//! | handle |    |  peg  |    |  peg  |    | fat state |
//! +--------+    +-------+    +-------+    +-----------+
//! | word *----->| next *---->| next *---->|    ...    |
//! +--------+    +-------+    +-------+    +-----------+
//! ```
//!
//! Once a pegging thread holds the fat state's mutex it *collapses* the
//! chain, swapping the word back to the fat pointer. The chain it displaces
//! may still be referenced by other pegging threads; it lives on as a
//! *secondary* chain, accounted for in the fat state's refcount, and
//! dissolves as each peg's refcount drains. Every peg holds a reference on
//! its successor, and a node's reference on its successor is only dropped
//! by whichever thread drops the node's own count to zero, so a walker's
//! local reference on its own peg transitively pins everything after it.

use core::alloc::Layout;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use static_assertions::const_assert;

use crate::backoff::Backoff;
use crate::error::Error;
use crate::loom::sync::atomic::{AtomicPtr, AtomicU8, Ordering, fence};
use crate::loom::sync::{Condvar, Mutex, MutexGuard};
use crate::loom::{alloc, loom_const_fn};

/// Type tag stored at offset zero of both node kinds, so a chain walk can
/// tell them apart before knowing which it has.
const TAG_FAT: u8 = 0;
const TAG_PEG: u8 = 1;

#[repr(C)]
struct Header {
    tag: u8,
}

/// The word value for "held, no fat state". Never a valid pointer: both
/// node types are pointer-aligned.
const LOCKED: *mut Header = ptr::without_provenance_mut(1);
const UNLOCKED: *mut Header = ptr::null_mut();

const_assert!(mem::align_of::<Peg>() > 1);
const_assert!(mem::align_of::<FatMutex>() > 1);
const_assert!(mem::offset_of!(Peg, header) == 0);
const_assert!(mem::offset_of!(FatMutex, header) == 0);

/// A transient shield installed on the handle word while a thread walks
/// toward the fat state.
#[repr(C)]
struct Peg {
    header: Header,
    /// One reference from the allocating thread plus one from the handle
    /// (or from the predecessor peg in a displaced chain). Never exceeds 2.
    refcount: AtomicU8,
    /// The next peg in the chain, or the terminal fat state. Written only
    /// before the peg is published.
    next: *mut Header,
}

/// The out-of-line state a handle grows once anything has to block on it.
#[repr(C)]
struct FatMutex {
    header: Header,
    state: Mutex<FatState>,
    /// Signalled when `held` goes false and there are waiters.
    held_cond: Condvar,
}

struct FatState {
    /// Whether the skinny mutex is logically held by some thread.
    held: bool,
    /// Threads parked on `held_cond` waiting to take ownership (either in
    /// a slow lock or in a transfer).
    waiters: usize,
    /// References pinning the fat state: queued waiters, pegs on secondary
    /// chains, threads parked in a condition wait, and a pseudo-reference
    /// from the current holder. Offset by -1: the primary chain's terminal
    /// reference is not counted, so zero means "only the handle pins me".
    refcount: usize,
    /// Bumped by [`RawMutex::veto_transfer`]; a transfer waiter that wakes
    /// to a different generation than it captured aborts.
    vetoes: u64,
}

/// A fat state located and locked through the handle.
type LockedFat<'a> = (&'a FatMutex, MutexGuard<'a, FatState>);

enum GetFatError {
    /// The handle word changed out from under the operation; re-read and
    /// retry.
    Raced,
    Alloc,
}

fn is_inline(p: *mut Header) -> bool {
    p.addr() <= 1
}

fn fat_header(fat: &FatMutex) -> *mut Header {
    ptr::from_ref(fat).cast_mut().cast::<Header>()
}

fn alloc_node<T>(value: T) -> Option<NonNull<T>> {
    // Safety: neither node type is zero-sized.
    let raw = unsafe { alloc::alloc(Layout::new::<T>()) };
    let node = NonNull::new(raw.cast::<T>())?;
    // Safety: freshly allocated with `T`'s layout.
    unsafe { node.as_ptr().write(value) };
    Some(node)
}

/// # Safety
///
/// `node` must come from [`alloc_node`], not already freed, and no other
/// thread may still reach it.
unsafe fn free_node<T>(node: NonNull<T>) {
    // Safety: per this function's contract.
    unsafe {
        ptr::drop_in_place(node.as_ptr());
        alloc::dealloc(node.as_ptr().cast::<u8>(), Layout::new::<T>());
    }
}

fn lock_state(fat: &FatMutex) -> MutexGuard<'_, FatState> {
    // No user code ever runs while the fat state is locked, so the mutex
    // cannot be poisoned.
    fat.state.lock().unwrap_or_else(|e| e.into_inner())
}

fn wait_state<'a>(fat: &'a FatMutex, state: MutexGuard<'a, FatState>) -> MutexGuard<'a, FatState> {
    fat.held_cond
        .wait(state)
        .unwrap_or_else(|e| e.into_inner())
}

/// Drops `n` references from a peg, returning `true` if the count reached
/// zero and the peg may be freed.
fn drop_peg_refs(refcount: &AtomicU8, n: u8) -> bool {
    if refcount.fetch_sub(n, Ordering::Release) == n {
        fence(Ordering::Acquire);
        true
    } else {
        false
    }
}

/// Takes ownership through a located, locked fat state.
///
/// The caller must already be accounted for in the refcount; that
/// contribution becomes the holder's pseudo-reference on return.
fn fat_lock<'a>(fat: &'a FatMutex, mut state: MutexGuard<'a, FatState>) {
    if state.held {
        state.waiters += 1;
        while state.held {
            state = wait_state(fat, state);
        }
        state.waiters -= 1;
    }
    state.held = true;
}

/// A mutual exclusion primitive that is a single pointer-sized word
/// whenever it is uncontended.
///
/// This is the raw, unscoped form: it does not protect any data and does
/// not track ownership, so `unlock` from a thread that never locked is only
/// detected when the handle is observably unheld. [`Mutex`] wraps it with
/// RAII guards.
///
/// A `RawMutex` whose storage is zeroed is a valid, unlocked mutex; `new`
/// just writes that zero.
///
/// [`Mutex`]: crate::Mutex
pub struct RawMutex {
    val: AtomicPtr<Header>,
}

// === impl RawMutex ===

impl RawMutex {
    loom_const_fn! {
        /// Creates a new, unlocked mutex.
        #[must_use]
        pub const fn new() -> RawMutex {
            RawMutex {
                val: AtomicPtr::new(ptr::null_mut()),
            }
        }
    }

    /// Acquires the mutex, blocking the current thread until it is free.
    ///
    /// Re-locking a mutex this thread already holds deadlocks.
    ///
    /// # Errors
    ///
    /// [`Error::AllocFailed`] if the out-of-line state needed to block
    /// could not be allocated. The mutex is not acquired.
    #[inline]
    pub fn lock(&self) -> Result<(), Error> {
        if self
            .val
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(())
        } else {
            self.lock_slow()
        }
    }

    /// Attempts to acquire the mutex without blocking.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if the mutex is held by another thread, or
    /// [`Error::AllocFailed`] if inspecting a contended handle required an
    /// allocation that failed.
    #[inline]
    pub fn try_lock(&self) -> Result<(), Error> {
        if self
            .val
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(())
        } else {
            self.try_lock_slow()
        }
    }

    /// Releases the mutex, waking one waiter if any are queued.
    ///
    /// # Errors
    ///
    /// [`Error::NotOwner`] if the mutex is observably unheld, or
    /// [`Error::AllocFailed`] from the contended path (the mutex stays
    /// held).
    #[inline]
    pub fn unlock(&self) -> Result<(), Error> {
        if self
            .val
            .compare_exchange(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            Ok(())
        } else {
            self.unlock_slow()
        }
    }

    /// Checks that the handle may be discarded.
    ///
    /// There is nothing to tear down (an idle handle is just a zero word),
    /// so this only verifies quiescence.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if the mutex is held, or pinned by waiters or
    /// parked condition waits.
    pub fn destroy(&self) -> Result<(), Error> {
        if self.val.load(Ordering::Acquire).is_null() {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    /// Releases the mutex and parks on `cond`, re-acquiring the mutex
    /// before returning. Wakeups may be spurious; callers re-check their
    /// predicate in a loop.
    ///
    /// # Errors
    ///
    /// [`Error::NotOwner`] if the mutex is observably unheld (nothing is
    /// released), or [`Error::AllocFailed`] if pinning the handle failed
    /// (the mutex stays held).
    pub fn wait(&self, cond: &Condvar) -> Result<(), Error> {
        let (fat, mut state) = self.fat_get_held()?;

        // About to let go of the mutex, so hand ownership on.
        if state.waiters > 0 {
            fat.held_cond.notify_one();
        }

        // Relinquish the mutex. The holder's refcount contribution stays
        // in place, pinning the fat state across the park.
        state.held = false;

        let state = cond.wait(state).unwrap_or_else(|e| e.into_inner());

        fat_lock(fat, state);
        Ok(())
    }

    /// Like [`wait`], but gives up once `timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// [`Error::TimedOut`] once the timeout elapses (the mutex has been
    /// re-acquired when this is returned), plus the errors of [`wait`].
    ///
    /// [`wait`]: Self::wait
    #[cfg(not(loom))]
    pub fn wait_timeout(&self, cond: &Condvar, timeout: core::time::Duration) -> Result<(), Error> {
        let (fat, mut state) = self.fat_get_held()?;

        if state.waiters > 0 {
            fat.held_cond.notify_one();
        }
        state.held = false;

        let (state, res) = cond
            .wait_timeout(state, timeout)
            .unwrap_or_else(|e| e.into_inner());

        fat_lock(fat, state);
        if res.timed_out() {
            Err(Error::TimedOut)
        } else {
            Ok(())
        }
    }

    /// Like [`wait_timeout`], but with an absolute deadline, which is the
    /// form re-waiting loops want.
    ///
    /// # Errors
    ///
    /// See [`wait_timeout`].
    ///
    /// [`wait_timeout`]: Self::wait_timeout
    #[cfg(not(loom))]
    pub fn wait_deadline(&self, cond: &Condvar, deadline: std::time::Instant) -> Result<(), Error> {
        self.wait_timeout(cond, deadline.saturating_duration_since(std::time::Instant::now()))
    }

    /// Atomically trades the held `self` for `target`: blocks until
    /// `target` can be taken, takes it, and only then releases `self`, so
    /// no other thread can ever observe this thread holding neither.
    ///
    /// Transferring a mutex onto itself is a no-op: the caller already
    /// holds the destination.
    ///
    /// # Errors
    ///
    /// [`Error::Vetoed`] if [`veto_transfer`] fired on `target` while this
    /// thread waited (`self` is still held), [`Error::NotOwner`] if `self`
    /// is observably unheld, or [`Error::AllocFailed`] (`self` is still
    /// held).
    ///
    /// [`veto_transfer`]: Self::veto_transfer
    pub fn transfer(&self, target: &RawMutex) -> Result<(), Error> {
        if ptr::eq(self, target) {
            return Ok(());
        }
        if self.val.load(Ordering::Acquire).is_null() {
            return Err(Error::NotOwner);
        }

        let mut boff = Backoff::new();
        loop {
            let head = target.val.load(Ordering::Acquire);
            if head.is_null() {
                if target
                    .val
                    .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
                boff.spin();
                continue;
            }

            match target.fat_get(head) {
                Ok((fat, mut state)) => {
                    // Pin the fat state while queued; on success the pin
                    // becomes the holder's pseudo-reference.
                    state.refcount += 1;
                    let vetoes = state.vetoes;
                    if state.held {
                        state.waiters += 1;
                        loop {
                            state = wait_state(fat, state);
                            if state.vetoes != vetoes {
                                state.waiters -= 1;
                                target.fat_release(fat, state);
                                return Err(Error::Vetoed);
                            }
                            if !state.held {
                                break;
                            }
                        }
                        state.waiters -= 1;
                    }
                    state.held = true;
                    break;
                }
                Err(GetFatError::Alloc) => return Err(Error::AllocFailed),
                Err(GetFatError::Raced) => boff.spin(),
            }
        }

        // The destination is held; now let go of the source.
        match self.unlock() {
            Ok(()) => Ok(()),
            Err(err) => {
                // The caller turned out not to hold the source. Hand the
                // destination back before reporting.
                let _ = target.unlock();
                Err(err)
            }
        }
    }

    /// Aborts every transfer currently waiting to take this mutex; each
    /// returns [`Error::Vetoed`] to its caller, which keeps holding its
    /// source mutex. The caller of `veto_transfer` must hold this mutex.
    ///
    /// # Errors
    ///
    /// [`Error::NotOwner`] if the mutex is observably unheld, or
    /// [`Error::AllocFailed`] if inspecting a contended handle required an
    /// allocation that failed.
    pub fn veto_transfer(&self) -> Result<(), Error> {
        // A transfer waiter pins a fat state, so a bare locked word proves
        // there is nothing to veto.
        if self.val.load(Ordering::Acquire) == LOCKED {
            return Ok(());
        }

        let (fat, mut state) = self.fat_get_held()?;
        state.vetoes += 1;
        if state.waiters > 0 {
            fat.held_cond.notify_all();
        }
        Ok(())
    }

    #[cold]
    fn lock_slow(&self) -> Result<(), Error> {
        let mut boff = Backoff::new();
        loop {
            let head = self.val.load(Ordering::Acquire);
            if head.is_null() {
                if self
                    .val
                    .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(());
                }
                boff.spin();
                continue;
            }

            match self.fat_get(head) {
                Ok((fat, mut state)) => {
                    // Pin the fat state while queued.
                    state.refcount += 1;
                    fat_lock(fat, state);
                    return Ok(());
                }
                Err(GetFatError::Alloc) => return Err(Error::AllocFailed),
                Err(GetFatError::Raced) => boff.spin(),
            }
        }
    }

    #[cold]
    fn try_lock_slow(&self) -> Result<(), Error> {
        let mut boff = Backoff::new();
        loop {
            let head = self.val.load(Ordering::Acquire);
            if head == LOCKED {
                return Err(Error::Busy);
            }
            if head.is_null() {
                if self
                    .val
                    .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(());
                }
                boff.spin();
                continue;
            }

            match self.fat_get(head) {
                Ok((_fat, mut state)) => {
                    if state.held {
                        return Err(Error::Busy);
                    }
                    state.held = true;
                    // The holder's pseudo-reference.
                    state.refcount += 1;
                    return Ok(());
                }
                Err(GetFatError::Alloc) => return Err(Error::AllocFailed),
                Err(GetFatError::Raced) => boff.spin(),
            }
        }
    }

    #[cold]
    fn unlock_slow(&self) -> Result<(), Error> {
        let (fat, mut state) = self.fat_get_held()?;

        state.held = false;
        if state.waiters > 0 {
            fat.held_cond.notify_one();
        }
        self.fat_release(fat, state);
        Ok(())
    }

    /// Locates and locks the fat state while this thread holds the mutex.
    fn fat_get_held(&self) -> Result<LockedFat<'_>, Error> {
        let mut boff = Backoff::new();
        loop {
            let head = self.val.load(Ordering::Acquire);
            if head.is_null() {
                return Err(Error::NotOwner);
            }
            match self.fat_get(head) {
                Ok((fat, state)) => {
                    if !state.held {
                        return Err(Error::NotOwner);
                    }
                    return Ok((fat, state));
                }
                Err(GetFatError::Alloc) => return Err(Error::AllocFailed),
                Err(GetFatError::Raced) => boff.spin(),
            }
        }
    }

    /// Locates and locks the fat state behind `head`, allocating one if
    /// the handle is still inline. Does not change the refcount.
    fn fat_get(&self, head: *mut Header) -> Result<LockedFat<'_>, GetFatError> {
        if is_inline(head) {
            self.promote(head)
        } else {
            self.peg(head)
        }
    }

    /// First allocation of the fat state, replacing an inline word.
    fn promote(&self, head: *mut Header) -> Result<LockedFat<'_>, GetFatError> {
        let held = head == LOCKED;
        let Some(fat) = alloc_node(FatMutex {
            header: Header { tag: TAG_FAT },
            state: Mutex::new(FatState {
                held,
                waiters: 0,
                // The holder's pseudo-reference, if the word was locked.
                refcount: usize::from(held),
                vetoes: 0,
            }),
            held_cond: Condvar::new(),
        }) else {
            return Err(GetFatError::Alloc);
        };
        // Safety: freshly allocated and initialized above.
        let fat_ref = unsafe { fat.as_ref() };
        let state = lock_state(fat_ref);

        // Publish, unless the word moved on while we were allocating.
        if self
            .val
            .compare_exchange(head, fat_header(fat_ref), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            Ok((fat_ref, state))
        } else {
            drop(state);
            // Safety: the CAS failed, so the state was never published and
            // this thread is its only owner.
            unsafe { free_node(fat) };
            Err(GetFatError::Raced)
        }
    }

    /// Installs a peg over `head`, walks to the fat state, locks it, and
    /// collapses the primary chain again.
    fn peg(&self, mut head: *mut Header) -> Result<LockedFat<'_>, GetFatError> {
        debug_assert!(!is_inline(head));

        let Some(peg) = alloc_node(Peg {
            header: Header { tag: TAG_PEG },
            // One reference from this thread, one from the handle once the
            // peg is installed.
            refcount: AtomicU8::new(2),
            next: head,
        }) else {
            return Err(GetFatError::Alloc);
        };
        let peg_hdr: *mut Header = peg.as_ptr().cast::<Header>();

        while let Err(cur) =
            self.val
                .compare_exchange(head, peg_hdr, Ordering::AcqRel, Ordering::Acquire)
        {
            if is_inline(cur) {
                // No fat state left to chase; backtrack.
                // Safety: the peg was never published.
                unsafe { free_node(peg) };
                return Err(GetFatError::Raced);
            }
            head = cur;
            // Safety: the peg is not published yet, this thread owns it.
            unsafe { (*peg.as_ptr()).next = cur };
        }

        // The installed peg pins everything after it, so the chain can be
        // walked without it disappearing underneath us.
        let mut p = head;
        // Safety: chain nodes stay allocated while our peg is installed;
        // the tag says which shape each node has.
        while unsafe { (*p).tag } == TAG_PEG {
            // Safety: `p` is a live peg, per the tag.
            p = unsafe { (*p.cast::<Peg>()).next };
        }
        // Safety: the walk ended at the terminal node, which is the fat
        // state, and it is pinned for as long as our peg holds references.
        let fat = unsafe { &*p.cast::<FatMutex>().cast_const() };
        let fat_hdr = fat_header(fat);
        let mut state = lock_state(fat);

        // Collapse the primary chain: point the handle straight back at
        // the fat state. Whatever chain that displaces may live on for a
        // while as a secondary chain, so until proven otherwise it counts
        // as a reference. Refcounts may only drain to zero inside this
        // section, serialized by the fat state's mutex.
        let old = self.val.swap(fat_hdr, Ordering::AcqRel);
        state.refcount += 1;

        // Walk the displaced chain. It ends at our own peg, at the fat
        // state, or at the first foreign peg that survives the decrement
        // (and thereby anchors a real secondary chain).
        let mut p = old;
        let own_decr;
        loop {
            if p == peg_hdr {
                // The displaced chain handed our peg's handle reference
                // back to us: both of its references are ours to drop.
                own_decr = 2;
                break;
            }
            if p == fat_hdr {
                // The displaced chain was the terminal reference, and it
                // is fully dissolved.
                state.refcount -= 1;
                own_decr = 1;
                break;
            }
            let other = p.cast::<Peg>();
            // Safety: we hold the displaced chain's reference on this
            // node, so it is live.
            if !drop_peg_refs(unsafe { &(*other).refcount }, 1) {
                // The peg survives; a secondary chain remains, keeping
                // the reference added above.
                own_decr = 1;
                break;
            }
            // Safety: the count hit zero, so this thread owns the peg.
            let next = unsafe { (*other).next };
            // Safety: as above, plus no other thread can reach it.
            unsafe { free_node(NonNull::new_unchecked(other)) };
            p = next;
        }

        // Drop this thread's reference(s) on its own peg, then keep
        // dissolving the tail it was holding up.
        let mut cur = peg;
        let mut decr = own_decr;
        loop {
            // Safety: our local reference keeps `cur` live until this
            // very decrement.
            if !drop_peg_refs(unsafe { &(*cur.as_ptr()).refcount }, decr) {
                // Still referenced; it anchors a secondary chain.
                break;
            }
            // Safety: the count hit zero, so this thread owns the peg.
            let next = unsafe { (*cur.as_ptr()).next };
            // Safety: as above.
            unsafe { free_node(cur) };
            if next == fat_hdr {
                // Another terminal reference gone.
                state.refcount -= 1;
                break;
            }
            // Safety: not the fat state, so a peg by construction.
            cur = unsafe { NonNull::new_unchecked(next.cast::<Peg>()) };
            decr = 1;
        }

        Ok((fat, state))
    }

    /// Drops one reference, demoting the handle back to a zero word and
    /// freeing the fat state when this was the last one.
    fn fat_release(&self, fat: &FatMutex, mut state: MutexGuard<'_, FatState>) {
        state.refcount -= 1;
        // With the count at zero, only the handle still pins the fat
        // state, and only if it points directly at it with no pegs in
        // between; exactly the case the CAS tests.
        let teardown = state.refcount == 0
            && self
                .val
                .compare_exchange(fat_header(fat), UNLOCKED, Ordering::Release, Ordering::Relaxed)
                .is_ok();
        drop(state);
        if teardown {
            // Safety: the handle no longer reaches the fat state and the
            // last counted reference is gone, so no thread can observe it.
            unsafe { free_node(NonNull::from(fat)) };
        }
    }
}

impl Default for RawMutex {
    fn default() -> RawMutex {
        RawMutex::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self.val.load(Ordering::Relaxed);
        let state = if val.is_null() {
            "unlocked"
        } else if val == LOCKED {
            "locked"
        } else {
            "contended"
        };
        f.debug_struct("RawMutex").field("state", &state).finish()
    }
}

#[cfg(all(feature = "lock_api", not(loom)))]
// Safety: `lock` does not return before exclusive ownership is acquired,
// and ownership is not tied to a particular thread.
unsafe impl lock_api::RawMutex for RawMutex {
    #[allow(clippy::declare_interior_mutable_const, reason = "required by the lock_api contract")]
    const INIT: Self = RawMutex::new();
    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        if RawMutex::lock(self).is_err() {
            std::alloc::handle_alloc_error(Layout::new::<FatMutex>());
        }
    }

    fn try_lock(&self) -> bool {
        // Failing to allocate counts as failing to acquire.
        RawMutex::try_lock(self).is_ok()
    }

    unsafe fn unlock(&self) {
        match RawMutex::unlock(self) {
            Ok(()) => {}
            Err(Error::AllocFailed) => std::alloc::handle_alloc_error(Layout::new::<Peg>()),
            Err(err) => debug_assert!(false, "unlock of a held mutex failed: {err}"),
        }
    }

    fn is_locked(&self) -> bool {
        // Pessimistic: a handle pinned by a parked condition waiter reads
        // as locked even between lock/unlock pairs.
        !self.val.load(Ordering::Relaxed).is_null()
    }
}
