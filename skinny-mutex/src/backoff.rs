// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::hint;

/// An [exponential backoff] for the protocol retry loops.
///
/// A retry only happens after another thread changed the handle word, so
/// these loops make global progress; the backoff just keeps chasing threads
/// from hammering the cache line.
///
/// [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff
#[derive(Debug, Copy, Clone)]
pub struct Backoff {
    exp: u8,
}

// === impl Backoff ===

impl Backoff {
    /// The maximum exponent (2^6 spins per round).
    pub const MAX_EXPONENT: u8 = 6;

    #[must_use]
    pub const fn new() -> Self {
        Self { exp: 0 }
    }

    /// Backs off in a spin loop, issuing `2^exp` [spin loop hints] and then
    /// bumping the exponent up to [`Self::MAX_EXPONENT`].
    ///
    /// [spin loop hints]: hint::spin_loop
    #[inline(always)]
    pub fn spin(&mut self) {
        let spins = 1_u32 << self.exp;

        for _ in 0..spins {
            // In tests, especially in loom tests, we need to yield the thread back to the runtime
            // so it can make progress. See https://github.com/tokio-rs/loom/issues/162#issuecomment-665128979
            #[cfg(any(test, loom))]
            crate::loom::thread::yield_now();

            hint::spin_loop();
        }

        if self.exp < Self::MAX_EXPONENT {
            self.exp += 1;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
