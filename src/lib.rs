//! assoc-store: ordered and hashed associative containers with stable
//! positions.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one storage engine behind eight container front-ends (tree and
//!   hash, map and set, unique and multi), with iterator-like positions
//!   that survive unrelated mutation.
//! - Layers:
//!   - ElementStore<K, V>: owns every entry in a generational arena,
//!     chained into a circular doubly-linked list through a permanent
//!     sentinel (`end()`). Hands out positions.
//!   - TreeIndex<C>: red-black tree over store slots, ordered by a
//!     comparator `C`. Node topology lives in its own arena.
//!   - HashIndex<S>: bucket table over store slots, hashed by a
//!     `BuildHasher` `S`, growing by doubling under a max load factor.
//!   - Assoc<K, V, I, P>: facade binding one store to one index `I` under
//!     a uniqueness policy `P` (`Unique` or `Multi`).
//!
//! Constraints
//! - Single-threaded: containers are `!Send`/`!Sync`; every call runs to
//!   completion.
//! - Positions are `Copy` handles `(container id, generational slot)`.
//!   They stay valid until their own entry is erased; stale or foreign
//!   positions are rejected with an error, never dereferenced.
//! - Ordered containers keep the store sequence sorted, so iteration,
//!   `next` and `prev` are O(1) list steps. Hashed containers iterate in
//!   insertion order; rehashing never reorders it.
//! - Lookups: O(log n) for trees, O(1) average for hash tables.
//!
//! Lifecycle and failure boundaries
//! - Insert: the index decides placement, the store splices, the index
//!   registers. Erase: the index unregisters, then the store unlinks.
//! - Calls taking positions validate them before any mutation, so an
//!   `Err` leaves the container untouched.
//! - Missing keys are not errors: `find` returns `end()`, `get` returns
//!   `None`. Only `at` reports `Error::KeyNotFound`.
//!
//! Hasher and rehashing invariants
//! - The hash of each entry is computed once, when its insert asks the
//!   table for a placement, and cached per slot. Rehashing, erasing and
//!   merging-out move entries by the cached hash; the user's hasher runs
//!   again only for key-based lookups.
//! - The max load factor is at least `MIN_MAX_LOAD_FACTOR` (1/64), so the
//!   table never needs more than 64 buckets per entry.
//!
//! Reentrancy
//! - Comparators, hashers and `Eq` impls run while an index is mid-lookup.
//!   A debug-only guard panics if they call back into the same container.
//!
//! Notes and non-goals
//! - Keys are immutable after insertion; there is no `key_mut`.
//! - Comparators must be strict weak orderings and `Eq` must agree with
//!   `Hash`; violations are not detected.
//! - No persistence and no concurrent access.

mod assoc;
mod compare;
mod containers;
mod error;
mod hash_index;
mod index;
mod reentrancy;
mod store;
mod tree;

#[cfg(test)]
mod assoc_proptest;

pub use assoc::{Assoc, Multi, Policy, Unique};
pub use compare::{Compare, Greater, Less};
pub use containers::{
    HashMap, HashMultiMap, HashMultiSet, HashSet, TreeMap, TreeMultiMap, TreeMultiSet, TreeSet,
};
pub use error::{Error, ErrorCategory};
pub use hash_index::{
    HashConfig, HashIndex, DEFAULT_MAX_LOAD_FACTOR, MIN_BUCKET_COUNT, MIN_MAX_LOAD_FACTOR,
};
pub use hashbrown::hash_map::DefaultHashBuilder;
pub use store::{IntoIter, Iter, IterMut, Position};
pub use tree::TreeIndex;
