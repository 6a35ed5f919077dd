//! The interface the facade drives, implemented by both index kinds.
//!
//! `KeyIndex` covers structural work keyed by the owned key type: where a
//! new entry goes, registering and unregistering slots. Placement hands
//! back a token with whatever it learned about the key, and register
//! consumes it, so an insert looks at the key once. `KeyLookup` covers
//! queries by any borrowed form `Q` of the key; it is a separate trait
//! because the ordered and hashed indexes need different bounds on `Q`.

use crate::compare::Compare;
use crate::hash_index::HashIndex;
use crate::store::{ElementStore, SlotKey};
use crate::tree::TreeIndex;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};

/// Where an insert lands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Placement<T> {
    /// A unique container already holds an equivalent key here.
    Occupied(SlotKey),
    /// Splice the new entry in before this store slot, then register it
    /// with the token.
    Vacant(SlotKey, T),
}

pub trait KeyIndex<K, V> {
    /// Carried from `placement` to `register`: nothing for the tree, the
    /// key's hash for the table.
    type Token: Copy;

    fn placement(
        &self,
        store: &ElementStore<K, V>,
        key: &K,
        multi: bool,
    ) -> Placement<Self::Token>;
    fn register(&mut self, store: &ElementStore<K, V>, slot: SlotKey, token: Self::Token);
    /// Drop `slot` without consulting its key.
    fn unregister(&mut self, slot: SlotKey);
    fn reset(&mut self);
}

pub trait KeyLookup<K, V, Q: ?Sized> {
    fn find_slot(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey>;
    /// Existence only; may stop at any equivalent entry.
    fn contains(&self, store: &ElementStore<K, V>, q: &Q) -> bool;
    /// Every slot holding an equivalent key. For ordered indexes these are
    /// contiguous in the store, first to last.
    fn equal_slots(&self, store: &ElementStore<K, V>, q: &Q) -> Vec<SlotKey>;
    fn count_equal(&self, store: &ElementStore<K, V>, q: &Q) -> usize;
}

impl<K, V, C> KeyIndex<K, V> for TreeIndex<C>
where
    C: Compare<K>,
{
    type Token = ();

    fn placement(&self, store: &ElementStore<K, V>, key: &K, multi: bool) -> Placement<()> {
        if multi {
            return Placement::Vacant(self.upper_bound(store, key).unwrap_or(store.end()), ());
        }
        match self.lower_bound(store, key) {
            Some(lb) if !self.comparator().less(key, store.indexed_key(lb)) => {
                Placement::Occupied(lb)
            }
            Some(lb) => Placement::Vacant(lb, ()),
            None => Placement::Vacant(store.end(), ()),
        }
    }

    fn register(&mut self, store: &ElementStore<K, V>, slot: SlotKey, _token: ()) {
        self.insert(store, slot);
    }

    fn unregister(&mut self, slot: SlotKey) {
        let found = self.erase(slot);
        debug_assert!(found, "unregistering a slot the tree never held");
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<K, V, Q, C> KeyLookup<K, V, Q> for TreeIndex<C>
where
    K: Borrow<Q>,
    Q: ?Sized,
    C: Compare<Q>,
{
    fn find_slot(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey> {
        // lower_bound rather than nearest: in a multi container the first of
        // an equal run is the answer.
        self.lower_bound(store, q)
            .filter(|&k| !self.comparator().less(q, store.indexed_key(k).borrow()))
    }

    fn contains(&self, store: &ElementStore<K, V>, q: &Q) -> bool {
        self.nearest(store, q)
            .is_some_and(|k| self.comparator().equivalent(q, store.indexed_key(k).borrow()))
    }

    fn equal_slots(&self, store: &ElementStore<K, V>, q: &Q) -> Vec<SlotKey> {
        let mut out = Vec::new();
        let mut k = match self.find_slot(store, q) {
            Some(k) => k,
            None => return out,
        };
        let end = store.end();
        while k != end && !self.comparator().less(q, store.indexed_key(k).borrow()) {
            out.push(k);
            k = store.next(k);
        }
        out
    }

    fn count_equal(&self, store: &ElementStore<K, V>, q: &Q) -> usize {
        self.equal_slots(store, q).len()
    }
}

impl<K, V, S> KeyIndex<K, V> for HashIndex<S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Token = u64;

    fn placement(&self, store: &ElementStore<K, V>, key: &K, multi: bool) -> Placement<u64> {
        let hash = self.make_hash(key);
        if !multi {
            if let Some(k) = self.find_hashed(store, key, hash) {
                return Placement::Occupied(k);
            }
        }
        Placement::Vacant(store.end(), hash)
    }

    fn register(&mut self, _store: &ElementStore<K, V>, slot: SlotKey, hash: u64) {
        self.insert(slot, hash);
    }

    fn unregister(&mut self, slot: SlotKey) {
        let found = self.erase(slot);
        debug_assert!(found, "unregistering a slot the table never held");
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<K, V, Q, S> KeyLookup<K, V, Q> for HashIndex<S>
where
    K: Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    fn find_slot(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey> {
        self.find(store, q)
    }

    fn contains(&self, store: &ElementStore<K, V>, q: &Q) -> bool {
        self.find(store, q).is_some()
    }

    fn equal_slots(&self, store: &ElementStore<K, V>, q: &Q) -> Vec<SlotKey> {
        self.find_all(store, q)
    }

    fn count_equal(&self, store: &ElementStore<K, V>, q: &Q) -> usize {
        self.count(store, q)
    }
}
