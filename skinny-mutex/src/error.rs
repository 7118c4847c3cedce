// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

/// Errors reported by the mutex operations.
///
/// Compare-and-swap failures are never reported through this type; they are
/// internal retry signals. Only conditions the caller has to act on show up
/// here.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Allocating the fat state or a peg failed.
    AllocFailed,
    /// The operation requires the caller to hold the mutex, and it is
    /// observably unheld.
    NotOwner,
    /// [`try_lock`] found the mutex held, or [`destroy`] found the handle
    /// still in use.
    ///
    /// [`try_lock`]: crate::RawMutex::try_lock
    /// [`destroy`]: crate::RawMutex::destroy
    Busy,
    /// A timed wait ran out before the condition variable was signalled.
    /// The mutex has been re-acquired.
    TimedOut,
    /// A concurrent [`veto_transfer`] aborted the transfer. The source
    /// mutex is still held.
    ///
    /// [`veto_transfer`]: crate::RawMutex::veto_transfer
    Vetoed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocFailed => f.write_str("memory allocation failed"),
            Error::NotOwner => f.write_str("calling thread does not hold the mutex"),
            Error::Busy => f.write_str("mutex is busy"),
            Error::TimedOut => f.write_str("wait timed out"),
            Error::Vetoed => f.write_str("transfer was vetoed"),
        }
    }
}

impl core::error::Error for Error {}
