//! Assoc: the container facade over one element store and one index.
//!
//! `Assoc<K, V, I, P>` owns the entries (in the store) and keeps exactly one
//! index `I` in step with them: a [`TreeIndex`] for ordered containers or a
//! [`HashIndex`] for hashed ones. `P` is the uniqueness policy. Both are
//! fixed by type at construction.
//!
//! Every mutation follows the same order: on insert the store splices the
//! entry in and the index then registers it; on erase the index
//! unregisters first and the store unlinks last, so the index never holds
//! a slot whose entry is gone. Calls that take a [`Position`] validate it
//! before touching anything, so a rejected call leaves the container as it
//! was.

use crate::compare::{Compare, Less};
use crate::error::Error;
use crate::hash_index::{HashConfig, HashIndex};
use crate::index::{KeyIndex, KeyLookup, Placement};
use crate::reentrancy::Reentry;
use crate::store::{ElementStore, IntoIter, Iter, IterMut, Position, SlotKey};
use crate::tree::TreeIndex;
use core::borrow::Borrow;
use core::fmt;
use core::hash::BuildHasher;
use core::marker::PhantomData;
use hashbrown::hash_map::DefaultHashBuilder;

/// Uniqueness policy of a container.
pub trait Policy {
    /// Whether equivalent keys may coexist.
    const MULTI: bool;
}

/// At most one entry per key; inserting a present key is a no-op.
#[derive(Copy, Clone, Debug, Default)]
pub struct Unique;

/// Any number of entries per key; equal keys keep insertion order.
#[derive(Copy, Clone, Debug, Default)]
pub struct Multi;

impl Policy for Unique {
    const MULTI: bool = false;
}

impl Policy for Multi {
    const MULTI: bool = true;
}

pub struct Assoc<K, V, I, P> {
    store: ElementStore<K, V>,
    index: I,
    reentry: Reentry,
    _policy: PhantomData<P>,
}

impl<K, V, I, P> Assoc<K, V, I, P> {
    fn from_index(index: I) -> Self {
        Self {
            store: ElementStore::new(),
            index,
            reentry: Reentry::default(),
            _policy: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Position of the first entry, or `end()` when empty.
    pub fn begin(&self) -> Position {
        self.store.position(self.store.begin())
    }

    /// The past-the-end sentinel. Stable for the container's lifetime.
    pub fn end(&self) -> Position {
        self.store.position(self.store.end())
    }

    pub fn next(&self, pos: Position) -> Result<Position, Error> {
        let k = self.store.resolve(pos)?;
        if k == self.store.end() {
            return Err(Error::EndPosition);
        }
        Ok(self.store.position(self.store.next(k)))
    }

    pub fn prev(&self, pos: Position) -> Result<Position, Error> {
        let k = self.store.resolve(pos)?;
        if k == self.store.begin() {
            return Err(Error::BeforeBegin);
        }
        Ok(self.store.position(self.store.prev(k)))
    }

    pub fn entry(&self, pos: Position) -> Result<(&K, &V), Error> {
        let k = self.store.resolve_entry(pos)?;
        Ok(self
            .store
            .entry(k)
            .expect("resolved entry slot holds an entry"))
    }

    pub fn key(&self, pos: Position) -> Result<&K, Error> {
        self.entry(pos).map(|(k, _)| k)
    }

    pub fn value(&self, pos: Position) -> Result<&V, Error> {
        self.entry(pos).map(|(_, v)| v)
    }

    pub fn value_mut(&mut self, pos: Position) -> Result<&mut V, Error> {
        let k = self.store.resolve_entry(pos)?;
        Ok(self
            .store
            .value_mut(k)
            .expect("resolved entry slot holds an entry"))
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.store.entry(self.store.begin())
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        self.store.entry(self.store.prev(self.store.end()))
    }

    /// Entries in sequence order: sorted for ordered containers, insertion
    /// order for hashed ones.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.store.iter_range(self.store.begin(), self.store.end())
    }

    /// Entries of `[first, last)`.
    pub fn range(&self, first: Position, last: Position) -> Result<Iter<'_, K, V>, Error> {
        let (from, to) = self.resolve_range(first, last)?;
        Ok(self.store.iter_range(from, to))
    }

    /// `iter` with writable values. Keys stay shared: changing one would
    /// break the index.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.store.iter_mut()
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + '_ {
        self.iter().map(|(_, k, _)| k)
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + '_ {
        self.iter().map(|(_, _, v)| v)
    }

    pub fn values_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, _, v)| v)
    }

    /// Exchange contents with `other`. Positions follow their entries, so a
    /// position taken from `self` now resolves in `other`.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.store, &mut other.store);
        core::mem::swap(&mut self.index, &mut other.index);
    }

    fn resolve_range(&self, first: Position, last: Position) -> Result<(SlotKey, SlotKey), Error> {
        let from = self.store.resolve(first)?;
        let to = self.store.resolve(last)?;
        let end = self.store.end();
        let mut k = from;
        while k != to {
            if k == end {
                return Err(Error::InvertedRange);
            }
            k = self.store.next(k);
        }
        Ok((from, to))
    }
}

impl<K, V, I, P> Assoc<K, V, I, P>
where
    I: KeyIndex<K, V>,
    P: Policy,
{
    /// Insert `key -> value`. A unique container that already holds `key`
    /// keeps its entry and returns it with `false`; `value` is dropped.
    pub fn insert(&mut self, key: K, value: V) -> (Position, bool) {
        self.insert_with(key, || value)
    }

    /// Like `insert`, but only builds the value when an entry is created.
    pub fn insert_with<F>(&mut self, key: K, make: F) -> (Position, bool)
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentry.enter();
        match self.index.placement(&self.store, &key, P::MULTI) {
            Placement::Occupied(k) => (self.store.position(k), false),
            Placement::Vacant(before, token) => {
                let k = Self::splice(&mut self.store, &mut self.index, before, token, key, make());
                (self.store.position(k), true)
            }
        }
    }

    /// Erase the entry at `pos` and return the position that followed it.
    pub fn erase_at(&mut self, pos: Position) -> Result<Position, Error> {
        let _g = self.reentry.enter();
        let k = self.store.resolve_entry(pos)?;
        let (_, _, next) = Self::remove_slot(&mut self.store, &mut self.index, k);
        Ok(self.store.position(next))
    }

    /// Erase the entry at `pos` and hand it back.
    pub fn extract_at(&mut self, pos: Position) -> Result<(K, V), Error> {
        let _g = self.reentry.enter();
        let k = self.store.resolve_entry(pos)?;
        let (key, value, _) = Self::remove_slot(&mut self.store, &mut self.index, k);
        Ok((key, value))
    }

    /// Remove and return the entry `find(q)` names, if any.
    pub fn extract<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        let k = self.index.find_slot(&self.store, q)?;
        let (key, value, _) = Self::remove_slot(&mut self.store, &mut self.index, k);
        Some((key, value))
    }

    /// Move every entry of `other` that this container accepts into it and
    /// return how many moved. A unique container leaves behind, in `other`,
    /// the entries whose key it already holds. Moved entries get positions
    /// in `self`; their old positions go stale.
    pub fn merge(&mut self, other: &mut Self) -> usize {
        let _g = self.reentry.enter();
        let _og = other.reentry.enter();
        let end = other.store.end();
        let mut moved = 0;
        let mut k = other.store.begin();
        while k != end {
            let next = other.store.next(k);
            let placement = self
                .index
                .placement(&self.store, other.store.indexed_key(k), P::MULTI);
            if let Placement::Vacant(before, token) = placement {
                let (key, value, _) = Self::remove_slot(&mut other.store, &mut other.index, k);
                Self::splice(&mut self.store, &mut self.index, before, token, key, value);
                moved += 1;
            }
            k = next;
        }
        if moved > 0 {
            tracing::debug!(moved, left = other.store.len(), "merged containers");
        }
        moved
    }

    /// Erase every entry of `[first, last)` and return `last`.
    pub fn erase_range(&mut self, first: Position, last: Position) -> Result<Position, Error> {
        let _g = self.reentry.enter();
        let (mut k, to) = self.resolve_range(first, last)?;
        while k != to {
            k = Self::remove_slot(&mut self.store, &mut self.index, k).2;
        }
        Ok(last)
    }

    pub fn clear(&mut self) {
        let _g = self.reentry.enter();
        if !self.store.is_empty() {
            tracing::debug!(len = self.store.len(), "clearing container");
        }
        self.index.reset();
        self.store.clear();
    }

    // Store first, then index: the index learns about a slot only once it
    // holds an entry.
    fn splice(
        store: &mut ElementStore<K, V>,
        index: &mut I,
        before: SlotKey,
        token: I::Token,
        key: K,
        value: V,
    ) -> SlotKey {
        let k = store.insert_before(before, key, value);
        index.register(store, k, token);
        k
    }

    // Index first, then store. Returns the entry and the slot after it.
    fn remove_slot(store: &mut ElementStore<K, V>, index: &mut I, k: SlotKey) -> (K, V, SlotKey) {
        index.unregister(k);
        store.erase(k).expect("validated slot is a live entry")
    }

    /// Position of an entry with key `q`, or `end()`. In a multi container
    /// this is the first of the equal run (ordered) or the first found in
    /// its bucket (hashed).
    pub fn find<Q>(&self, q: &Q) -> Position
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        let k = self
            .index
            .find_slot(&self.store, q)
            .unwrap_or(self.store.end());
        self.store.position(k)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        self.index.contains(&self.store, q)
    }

    pub fn count<Q>(&self, q: &Q) -> usize
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        if P::MULTI {
            self.index.count_equal(&self.store, q)
        } else {
            usize::from(self.index.find_slot(&self.store, q).is_some())
        }
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        let k = self.index.find_slot(&self.store, q)?;
        self.store.entry(k).map(|(_, v)| v)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        let k = self.index.find_slot(&self.store, q)?;
        self.store.value_mut(k)
    }

    /// Value for `q`, or [`Error::KeyNotFound`].
    pub fn at<Q>(&self, q: &Q) -> Result<&V, Error>
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        let k = self
            .index
            .find_slot(&self.store, q)
            .ok_or(Error::KeyNotFound)?;
        Ok(self
            .store
            .entry(k)
            .map(|(_, v)| v)
            .expect("indexed slot holds an entry"))
    }

    /// Erase every entry with key `q`; returns how many were removed.
    pub fn erase<Q>(&mut self, q: &Q) -> usize
    where
        I: KeyLookup<K, V, Q>,
        Q: ?Sized,
    {
        let _g = self.reentry.enter();
        let doomed = if P::MULTI {
            self.index.equal_slots(&self.store, q)
        } else {
            self.index.find_slot(&self.store, q).into_iter().collect()
        };
        for &k in &doomed {
            Self::remove_slot(&mut self.store, &mut self.index, k);
        }
        doomed.len()
    }

    /// Build a container from `(key, value)` pairs. For unique containers
    /// the first pair of each key wins.
    pub fn from_entries<T>(entries: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
        I: Default,
    {
        let mut out = Self::from_index(I::default());
        out.extend(entries);
        out
    }
}

impl<K, V, I> Assoc<K, V, I, Unique>
where
    I: KeyIndex<K, V>,
{
    /// Insert `key -> value`, or overwrite the value of the entry already
    /// holding an equivalent key (whose stored key is kept). `true` means
    /// an entry was created.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> (Position, bool) {
        let _g = self.reentry.enter();
        match self.index.placement(&self.store, &key, false) {
            Placement::Occupied(k) => {
                if let Some(v) = self.store.value_mut(k) {
                    *v = value;
                }
                (self.store.position(k), false)
            }
            Placement::Vacant(before, token) => {
                let k = Self::splice(&mut self.store, &mut self.index, before, token, key, value);
                (self.store.position(k), true)
            }
        }
    }
}

impl<K, I, P> Assoc<K, (), I, P>
where
    I: KeyIndex<K, ()>,
    P: Policy,
{
    /// Set insert.
    pub fn insert_key(&mut self, key: K) -> (Position, bool) {
        self.insert(key, ())
    }

    pub fn from_keys<T>(keys: T) -> Self
    where
        T: IntoIterator<Item = K>,
        I: Default,
    {
        Self::from_entries(keys.into_iter().map(|k| (k, ())))
    }
}

impl<K, V, P> Assoc<K, V, TreeIndex<Less>, P> {
    /// Ordered container sorted ascending by `Ord`.
    pub fn new() -> Self {
        Self::with_comparator(Less)
    }
}

impl<K, V, C, P> Assoc<K, V, TreeIndex<C>, P> {
    pub fn with_comparator(cmp: C) -> Self {
        Self::from_index(TreeIndex::new(cmp))
    }

    pub fn comparator(&self) -> &C {
        self.index.comparator()
    }

    /// First position whose key is not before `q`, or `end()`.
    pub fn lower_bound<Q>(&self, q: &Q) -> Position
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q>,
    {
        let _g = self.reentry.enter();
        let k = self
            .index
            .lower_bound(&self.store, q)
            .unwrap_or(self.store.end());
        self.store.position(k)
    }

    /// First position whose key is after `q`, or `end()`.
    pub fn upper_bound<Q>(&self, q: &Q) -> Position
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q>,
    {
        let _g = self.reentry.enter();
        let k = self
            .index
            .upper_bound(&self.store, q)
            .unwrap_or(self.store.end());
        self.store.position(k)
    }

    /// `(lower_bound(q), upper_bound(q))`: the run of keys equivalent to `q`.
    pub fn equal_range<Q>(&self, q: &Q) -> (Position, Position)
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q>,
    {
        let _g = self.reentry.enter();
        let end = self.store.end();
        let lo = self.index.lower_bound(&self.store, q).unwrap_or(end);
        let hi = self.index.upper_bound(&self.store, q).unwrap_or(end);
        (self.store.position(lo), self.store.position(hi))
    }
}

impl<K, V, P> Assoc<K, V, HashIndex<DefaultHashBuilder>, P> {
    /// Hashed container with the default hasher and settings.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    pub fn with_config(config: HashConfig) -> Result<Self, Error> {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V, S, P> Assoc<K, V, HashIndex<S>, P> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_index(HashIndex::new(hasher))
    }

    pub fn with_config_and_hasher(config: HashConfig, hasher: S) -> Result<Self, Error> {
        Ok(Self::from_index(HashIndex::with_config(hasher, config)?))
    }

    pub fn hasher(&self) -> &S {
        self.index.hasher()
    }

    pub fn bucket_count(&self) -> usize {
        self.index.bucket_count()
    }

    /// Number of entries in bucket `n`; zero for out-of-range `n`.
    pub fn bucket_size(&self, n: usize) -> usize {
        self.index.bucket_size(n)
    }

    /// Entries of bucket `n`, oldest first; nothing for out-of-range `n`.
    pub fn bucket_iter(&self, n: usize) -> impl Iterator<Item = (Position, &K, &V)> + '_ {
        self.index.bucket_slots(n).filter_map(move |k| {
            let (key, value) = self.store.entry(k)?;
            Some((self.store.position(k), key, value))
        })
    }

    pub fn load_factor(&self) -> f32 {
        self.index.load_factor()
    }

    pub fn max_load_factor(&self) -> f32 {
        self.index.max_load_factor()
    }

    /// Change the load bound, rehashing at once if the current load
    /// exceeds it.
    pub fn set_max_load_factor(&mut self, z: f32) -> Result<(), Error> {
        let _g = self.reentry.enter();
        self.index.set_max_load_factor(z)
    }

    /// Rebuild the bucket table with at least `n` buckets. Entries and
    /// positions are unaffected.
    pub fn rehash(&mut self, n: usize) {
        let _g = self.reentry.enter();
        self.index.rehash(n);
    }

    pub fn reserve(&mut self, n: usize) {
        let _g = self.reentry.enter();
        self.index.reserve(n);
    }
}

impl<K, V, S, P> Assoc<K, V, HashIndex<S>, P>
where
    S: BuildHasher,
{
    /// Bucket that holds, or would hold, key `q`.
    pub fn bucket<Q>(&self, q: &Q) -> usize
    where
        Q: ?Sized + core::hash::Hash,
    {
        let _g = self.reentry.enter();
        self.index.bucket_of(q)
    }
}

impl<K, V, I: Default, P> Default for Assoc<K, V, I, P> {
    fn default() -> Self {
        Self::from_index(I::default())
    }
}

impl<K, V, I, P> Clone for Assoc<K, V, I, P>
where
    K: Clone,
    V: Clone,
    I: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            index: self.index.clone(),
            reentry: Reentry::default(),
            _policy: PhantomData,
        }
    }
}

impl<K, V, I, P> Extend<(K, V)> for Assoc<K, V, I, P>
where
    I: KeyIndex<K, V>,
    P: Policy,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, I, P> FromIterator<(K, V)> for Assoc<K, V, I, P>
where
    I: KeyIndex<K, V> + Default,
    P: Policy,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_entries(iter)
    }
}

impl<'a, K, V, I, P> IntoIterator for &'a Assoc<K, V, I, P> {
    type Item = (Position, &'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, I, P> IntoIterator for &'a mut Assoc<K, V, I, P> {
    type Item = (Position, &'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, I, P> IntoIterator for Assoc<K, V, I, P> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.store.into_entries()
    }
}

impl<K, V, I, P> fmt::Debug for Assoc<K, V, I, P>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(_, k, v)| (k, v)))
            .finish()
    }
}

#[cfg(test)]
impl<K, V, C, P> Assoc<K, V, TreeIndex<C>, P>
where
    C: Compare<K>,
{
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        self.index.validate(&self.store)
    }

    pub(crate) fn tree_height(&self) -> usize {
        self.index.height()
    }
}

#[cfg(test)]
impl<K, V, S, P> Assoc<K, V, HashIndex<S>, P>
where
    K: core::hash::Hash,
    S: BuildHasher,
{
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        self.index.validate(&self.store)?;
        if self.index.len() != self.store.len() {
            return Err("index and store lengths differ".into());
        }
        Ok(())
    }
}
