//! Named front-ends over [`Assoc`].
//!
//! Each alias fixes the index kind and the uniqueness policy; everything
//! else comes from the facade. Sets are maps to `()` and add `insert_key`.

use crate::assoc::{Assoc, Multi, Unique};
use crate::compare::Less;
use crate::hash_index::HashIndex;
use crate::tree::TreeIndex;
use hashbrown::hash_map::DefaultHashBuilder;

/// Sorted map with unique keys.
pub type TreeMap<K, V, C = Less> = Assoc<K, V, TreeIndex<C>, Unique>;
/// Sorted map; equal keys keep insertion order.
pub type TreeMultiMap<K, V, C = Less> = Assoc<K, V, TreeIndex<C>, Multi>;
pub type TreeSet<K, C = Less> = Assoc<K, (), TreeIndex<C>, Unique>;
pub type TreeMultiSet<K, C = Less> = Assoc<K, (), TreeIndex<C>, Multi>;

/// Hashed map with unique keys; iterates in insertion order.
pub type HashMap<K, V, S = DefaultHashBuilder> = Assoc<K, V, HashIndex<S>, Unique>;
pub type HashMultiMap<K, V, S = DefaultHashBuilder> = Assoc<K, V, HashIndex<S>, Multi>;
pub type HashSet<K, S = DefaultHashBuilder> = Assoc<K, (), HashIndex<S>, Unique>;
pub type HashMultiSet<K, S = DefaultHashBuilder> = Assoc<K, (), HashIndex<S>, Multi>;
