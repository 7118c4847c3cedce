// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Space-efficient blocking mutexes.
//!
//! A [`Mutex`] (and the unscoped [`RawMutex`] underneath it) costs exactly
//! one pointer-sized word while it is uncontended. The first time a thread
//! has to block, the handle grows an out-of-line state carrying a
//! conventional blocking mutex and condition variable; once contention
//! subsides, the state is freed and the handle shrinks back to one word.
//! Waiters block in the kernel rather than spinning, so this is a drop-in
//! mutex for workloads with very many, mostly idle locks, such as hash
//! table buckets or fine-grained per-object locks.
//!
//! On top of the usual lock/unlock surface, a held mutex can be
//! [waited on with a condition variable](Condvar) and
//! [handed over atomically](MutexGuard::transfer) to another mutex.
//!
//! Growing and shrinking concurrently with other threads chasing the same
//! word is the tricky part; see the `raw` module source for the pegging
//! protocol that makes reclamation safe without any global or per-thread
//! tracking.
//!
//! A zeroed [`RawMutex`] is a valid, unlocked mutex, so statically
//! allocated handles need no runtime initialization.
//!
//! # Example
//!
//! ```
//! use skinny_mutex::Mutex;
//!
//! let counter = Mutex::new(0_u32);
//! *counter.lock().unwrap() += 1;
//! assert_eq!(counter.into_inner(), 1);
//! ```

mod backoff;
mod condvar;
mod error;
mod loom;
mod mutex;
mod raw;

pub use backoff::Backoff;
#[cfg(not(loom))]
pub use condvar::WaitTimeoutResult;
pub use condvar::{Condvar, WaitError};
pub use error::Error;
pub use mutex::{Mutex, MutexGuard, TransferError};
pub use raw::RawMutex;
