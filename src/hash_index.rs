//! Hash index: a bucket table over store slots.
//!
//! Each bucket is a short vector of `(hash, slot)` pairs. The hash is
//! computed once, when the facade asks where a new key goes, and is kept
//! per slot from then on: rehashing and erasing reuse it, so the user's
//! hasher never runs on a stored key again. Buckets only index entries;
//! the store sequence (insertion order) is never touched.
//!
//! Growth: before an insert would push `len / bucket_count` above the max
//! load factor, the table at least doubles. Doubling keeps the total rehash
//! work over `n` inserts at O(n).

use crate::error::Error;
use crate::store::{ElementStore, SlotKey};
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use slotmap::SecondaryMap;

/// Smallest bucket count a table ever has.
pub const MIN_BUCKET_COUNT: usize = 8;

pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 1.0;

/// Smallest accepted max load factor. Anything lower would size the table
/// at more than 64 buckets per entry.
pub const MIN_MAX_LOAD_FACTOR: f32 = 1.0 / 64.0;

/// Construction-time settings for hashed containers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HashConfig {
    /// Bucket count of a new or cleared container. Raised to
    /// [`MIN_BUCKET_COUNT`] if smaller.
    pub initial_buckets: usize,
    /// Upper bound on `len / bucket_count` maintained by inserts.
    pub max_load_factor: f32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            initial_buckets: MIN_BUCKET_COUNT,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
        }
    }
}

impl HashConfig {
    pub fn validate(&self) -> Result<(), Error> {
        check_load_factor(self.max_load_factor)
    }
}

fn check_load_factor(z: f32) -> Result<(), Error> {
    if z.is_finite() && z >= MIN_MAX_LOAD_FACTOR {
        Ok(())
    } else {
        Err(Error::BadLoadFactor(z))
    }
}

#[derive(Copy, Clone, Debug)]
struct Bucketed {
    hash: u64,
    slot: SlotKey,
}

#[derive(Clone, Debug)]
pub struct HashIndex<S> {
    hasher: S,
    buckets: Vec<Vec<Bucketed>>,
    hashes: SecondaryMap<SlotKey, u64>,
    len: usize,
    max_load_factor: f32,
    initial_buckets: usize,
}

impl<S: Default> Default for HashIndex<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

fn empty_buckets(n: usize) -> Vec<Vec<Bucketed>> {
    (0..n).map(|_| Vec::new()).collect()
}

impl<S> HashIndex<S> {
    pub(crate) fn new(hasher: S) -> Self {
        Self {
            hasher,
            buckets: empty_buckets(MIN_BUCKET_COUNT),
            hashes: SecondaryMap::new(),
            len: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            initial_buckets: MIN_BUCKET_COUNT,
        }
    }

    pub(crate) fn with_config(hasher: S, config: HashConfig) -> Result<Self, Error> {
        config.validate()?;
        let initial = config.initial_buckets.max(MIN_BUCKET_COUNT);
        Ok(Self {
            hasher,
            buckets: empty_buckets(initial),
            hashes: SecondaryMap::new(),
            len: 0,
            max_load_factor: config.max_load_factor,
            initial_buckets: initial,
        })
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn bucket_size(&self, n: usize) -> usize {
        self.buckets.get(n).map_or(0, Vec::len)
    }

    /// Slots of bucket `n` in bucket order; nothing for out-of-range `n`.
    pub(crate) fn bucket_slots(&self, n: usize) -> impl Iterator<Item = SlotKey> + '_ {
        self.buckets.get(n).into_iter().flatten().map(|e| e.slot)
    }

    pub(crate) fn load_factor(&self) -> f32 {
        self.len as f32 / self.bucket_count() as f32
    }

    pub(crate) fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    pub(crate) fn set_max_load_factor(&mut self, z: f32) -> Result<(), Error> {
        check_load_factor(z)?;
        tracing::debug!(from = self.max_load_factor, to = z, "max load factor changed");
        self.max_load_factor = z;
        if self.over_capacity(self.len) {
            self.rehash(0);
        }
        Ok(())
    }

    /// Fewest buckets that hold `n` entries within the max load factor.
    fn buckets_for(&self, n: usize) -> usize {
        // The load factor floor keeps this at most 64 * n.
        (n as f64 / f64::from(self.max_load_factor)).ceil() as usize
    }

    fn over_capacity(&self, n: usize) -> bool {
        n as f64 > self.bucket_count() as f64 * f64::from(self.max_load_factor)
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Rebuild the table with at least `n` buckets. The result is also never
    /// below [`MIN_BUCKET_COUNT`] nor below what the current length needs.
    pub(crate) fn rehash(&mut self, n: usize) {
        let target = n.max(MIN_BUCKET_COUNT).max(self.buckets_for(self.len));
        let from = self.buckets.len();
        if target == from {
            return;
        }
        let old = core::mem::replace(&mut self.buckets, empty_buckets(target));
        for entry in old.into_iter().flatten() {
            let i = self.bucket_index(entry.hash);
            self.buckets[i].push(entry);
        }
        tracing::trace!(from, to = target, len = self.len, "rehashed bucket table");
    }

    /// Make room for `n` entries without further automatic rehashing.
    pub(crate) fn reserve(&mut self, n: usize) {
        let needed = self.buckets_for(n);
        if needed > self.bucket_count() {
            self.rehash(needed);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buckets = empty_buckets(self.initial_buckets);
        self.hashes.clear();
        self.len = 0;
    }
}

impl<S: BuildHasher> HashIndex<S> {
    #[inline]
    pub(crate) fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub(crate) fn bucket_of<Q>(&self, q: &Q) -> usize
    where
        Q: ?Sized + Hash,
    {
        self.bucket_index(self.make_hash(q))
    }

    fn candidates<'a, K, V, Q>(
        &'a self,
        store: &'a ElementStore<K, V>,
        q: &'a Q,
    ) -> impl Iterator<Item = SlotKey> + 'a
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.candidates_hashed(store, q, self.make_hash(q))
    }

    fn candidates_hashed<'a, K, V, Q>(
        &'a self,
        store: &'a ElementStore<K, V>,
        q: &'a Q,
        hash: u64,
    ) -> impl Iterator<Item = SlotKey> + 'a
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.buckets[self.bucket_index(hash)]
            .iter()
            .filter(move |e| e.hash == hash && store.indexed_key(e.slot).borrow() == q)
            .map(|e| e.slot)
    }

    /// First slot in `q`'s bucket holding an equal key.
    pub(crate) fn find<K, V, Q>(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.candidates(store, q).next()
    }

    /// `find` with the hash of `q` already known.
    pub(crate) fn find_hashed<K, V, Q>(
        &self,
        store: &ElementStore<K, V>,
        q: &Q,
        hash: u64,
    ) -> Option<SlotKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.candidates_hashed(store, q, hash).next()
    }

    /// Every slot holding a key equal to `q`, in bucket order.
    pub(crate) fn find_all<K, V, Q>(&self, store: &ElementStore<K, V>, q: &Q) -> Vec<SlotKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.candidates(store, q).collect()
    }

    pub(crate) fn count<K, V, Q>(&self, store: &ElementStore<K, V>, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.candidates(store, q).count()
    }

    /// Register a freshly spliced store slot whose key hashes to `hash`,
    /// growing the table first if the new entry would exceed the max load
    /// factor.
    pub(crate) fn insert(&mut self, slot: SlotKey, hash: u64) {
        let projected = self.len + 1;
        if self.over_capacity(projected) {
            let grown = (self.bucket_count() * 2).max(self.buckets_for(projected));
            self.rehash(grown);
        }
        let i = self.bucket_index(hash);
        self.buckets[i].push(Bucketed { hash, slot });
        self.hashes.insert(slot, hash);
        self.len = projected;
    }

    /// Remove `slot` from its bucket by identity. Returns false if it was
    /// not indexed.
    pub(crate) fn erase(&mut self, slot: SlotKey) -> bool {
        let Some(hash) = self.hashes.remove(slot) else {
            return false;
        };
        let i = self.bucket_index(hash);
        let bucket = &mut self.buckets[i];
        match bucket.iter().position(|e| e.slot == slot) {
            Some(at) => {
                bucket.remove(at);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Check that every entry sits in the bucket its cached hash selects and
    /// that the table indexes exactly the store's entries.
    #[cfg(test)]
    pub(crate) fn validate<K, V>(&self, store: &ElementStore<K, V>) -> Result<(), String>
    where
        K: Hash,
    {
        let mut seen = std::collections::HashSet::new();
        for (i, bucket) in self.buckets.iter().enumerate() {
            for e in bucket {
                if self.bucket_index(e.hash) != i {
                    return Err(format!("entry in bucket {} belongs elsewhere", i));
                }
                if self.make_hash(store.indexed_key(e.slot)) != e.hash {
                    return Err("cached hash is stale".into());
                }
                if self.hashes.get(e.slot) != Some(&e.hash) {
                    return Err("per-slot hash disagrees with its bucket".into());
                }
                if !seen.insert(e.slot) {
                    return Err("slot indexed twice".into());
                }
            }
        }
        if seen.len() != self.len || self.len != store.len() || self.hashes.len() != self.len {
            return Err(format!(
                "index holds {} (len {}), store holds {}",
                seen.len(),
                self.len,
                store.len()
            ));
        }
        if self.bucket_count() < MIN_BUCKET_COUNT {
            return Err("bucket count below floor".into());
        }
        Ok(())
    }
}
