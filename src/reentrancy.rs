//! Catching callbacks that call back into their own container.
//!
//! Comparators, hashers and `Eq` impls run while an index is half-way
//! through a lookup or a rebalance. Each container carries a [`Reentry`]
//! flag and every facade entry point raises it for the length of the call
//! through [`Reentry::enter`]. A callback that reaches the same container
//! finds the flag up, and debug builds panic there instead of letting it
//! see a half-linked index. Release builds keep no flag.

use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug, Default)]
pub(crate) struct Reentry {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Also what makes containers !Send + !Sync, in every build.
    _local: PhantomData<*mut ()>,
}

impl Reentry {
    /// Mark the container busy until the returned value drops.
    #[inline]
    #[track_caller]
    pub(crate) fn enter(&self) -> Entered<'_> {
        #[cfg(debug_assertions)]
        {
            if self.busy.replace(true) {
                panic!("container re-entered from a comparator or hasher");
            }
        }
        Entered(self)
    }
}

impl Clone for Reentry {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// Held by a facade call for its duration.
#[cfg_attr(not(debug_assertions), allow(dead_code))]
pub(crate) struct Entered<'a>(&'a Reentry);

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.0.busy.set(false);
    }
}
