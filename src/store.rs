//! Element store: the sequence that owns every entry.
//!
//! Entries live in a generational arena and are chained into a circular
//! doubly-linked list through a permanent sentinel slot. The sentinel is the
//! `end()` position: it holds no entry, its `next` is the first entry and
//! its `prev` the last. Splicing and unlinking touch only the neighbours,
//! so a slot key stays valid until that exact entry is erased, and a reused
//! slot gets a new generation so stale keys never alias.

use crate::error::Error;
use core::iter::Flatten;
use core::sync::atomic::{AtomicU64, Ordering};
use slotmap::{new_key_type, SecondaryMap, SlotMap};

new_key_type! {
    /// Arena key of one store slot.
    pub struct SlotKey;
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
struct StoreId(u64);

impl StoreId {
    fn fresh() -> Self {
        StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable handle to one entry of a container, or to its `end()` sentinel.
///
/// Positions compare by identity: two positions are equal only if they name
/// the same slot of the same container. A position survives every mutation
/// except the erasure of its own entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Position {
    store: StoreId,
    slot: SlotKey,
}

#[derive(Debug, Clone)]
struct Slot<K, V> {
    entry: Option<(K, V)>,
    prev: SlotKey,
    next: SlotKey,
}

#[derive(Debug)]
pub struct ElementStore<K, V> {
    id: StoreId,
    slots: SlotMap<SlotKey, Slot<K, V>>,
    sentinel: SlotKey,
}

impl<K, V> ElementStore<K, V> {
    pub(crate) fn new() -> Self {
        let mut slots = SlotMap::with_key();
        let sentinel = slots.insert_with_key(|k| Slot {
            entry: None,
            prev: k,
            next: k,
        });
        Self {
            id: StoreId::fresh(),
            slots,
            sentinel,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - 1
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub(crate) fn begin(&self) -> SlotKey {
        self.slots[self.sentinel].next
    }

    #[inline]
    pub(crate) fn end(&self) -> SlotKey {
        self.sentinel
    }

    #[inline]
    pub(crate) fn next(&self, k: SlotKey) -> SlotKey {
        self.slots[k].next
    }

    #[inline]
    pub(crate) fn prev(&self, k: SlotKey) -> SlotKey {
        self.slots[k].prev
    }

    pub(crate) fn position(&self, slot: SlotKey) -> Position {
        Position {
            store: self.id,
            slot,
        }
    }

    /// Map a caller's position to a slot of this store, which may be the
    /// sentinel.
    pub(crate) fn resolve(&self, pos: Position) -> Result<SlotKey, Error> {
        if pos.store != self.id {
            return Err(Error::ForeignPosition);
        }
        if !self.slots.contains_key(pos.slot) {
            return Err(Error::StalePosition);
        }
        Ok(pos.slot)
    }

    /// Like `resolve`, but rejects the sentinel.
    pub(crate) fn resolve_entry(&self, pos: Position) -> Result<SlotKey, Error> {
        let k = self.resolve(pos)?;
        if k == self.sentinel {
            return Err(Error::EndPosition);
        }
        Ok(k)
    }

    pub(crate) fn entry(&self, k: SlotKey) -> Option<(&K, &V)> {
        self.slots
            .get(k)
            .and_then(|s| s.entry.as_ref())
            .map(|(key, value)| (key, value))
    }

    pub(crate) fn key(&self, k: SlotKey) -> Option<&K> {
        self.entry(k).map(|(key, _)| key)
    }

    pub(crate) fn value_mut(&mut self, k: SlotKey) -> Option<&mut V> {
        self.slots
            .get_mut(k)
            .and_then(|s| s.entry.as_mut())
            .map(|(_, value)| value)
    }

    /// Key of a slot an index holds. Indexes only ever hold live entry
    /// slots, so a miss here is a broken index.
    #[inline]
    pub(crate) fn indexed_key(&self, k: SlotKey) -> &K {
        self.key(k).expect("index refers to a live entry slot")
    }

    /// Splice a new entry in immediately before `before` and return its slot.
    pub(crate) fn insert_before(&mut self, before: SlotKey, key: K, value: V) -> SlotKey {
        let prev = self.slots[before].prev;
        let k = self.slots.insert(Slot {
            entry: Some((key, value)),
            prev,
            next: before,
        });
        self.slots[prev].next = k;
        self.slots[before].prev = k;
        k
    }

    /// Unlink an entry slot. Returns the entry and the slot that followed
    /// it, or `None` for the sentinel or an unknown slot.
    pub(crate) fn erase(&mut self, k: SlotKey) -> Option<(K, V, SlotKey)> {
        if k == self.sentinel {
            return None;
        }
        let slot = self.slots.remove(k)?;
        self.slots[slot.prev].next = slot.next;
        self.slots[slot.next].prev = slot.prev;
        let (key, value) = slot.entry.expect("non-sentinel slots hold an entry");
        Some((key, value, slot.next))
    }

    pub(crate) fn clear(&mut self) {
        let s = self.sentinel;
        self.slots.retain(|k, _| k == s);
        let sentinel = &mut self.slots[s];
        sentinel.prev = s;
        sentinel.next = s;
    }

    /// Iterate `[from, to)` in sequence order.
    pub(crate) fn iter_range(&self, from: SlotKey, to: SlotKey) -> Iter<'_, K, V> {
        Iter {
            store: self,
            front: from,
            back: to,
        }
    }

    /// Every entry in sequence order with its value writable.
    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        // The arena hands out disjoint borrows only in its own slot order,
        // so rank the slots by sequence first and sort the borrows into it.
        let mut rank = SecondaryMap::with_capacity(self.slots.capacity());
        let mut k = self.begin();
        while k != self.sentinel {
            rank.insert(k, rank.len());
            k = self.next(k);
        }
        let mut ordered: Vec<Option<(Position, &K, &mut V)>> = Vec::new();
        ordered.resize_with(rank.len(), || None);
        let id = self.id;
        for (slot, s) in self.slots.iter_mut() {
            if let (Some(&r), Some((key, value))) = (rank.get(slot), s.entry.as_mut()) {
                ordered[r] = Some((Position { store: id, slot }, &*key, value));
            }
        }
        IterMut {
            inner: ordered.into_iter().flatten(),
        }
    }

    /// Consume the store, yielding its entries in sequence order.
    pub(crate) fn into_entries(self) -> IntoIter<K, V> {
        IntoIter {
            front: self.begin(),
            back: self.prev(self.sentinel),
            remaining: self.len(),
            slots: self.slots,
        }
    }
}

impl<K: Clone, V: Clone> Clone for ElementStore<K, V> {
    // Slot keys carry over so a cloned index stays consistent; the identity
    // does not, so positions of the source are foreign to the copy.
    fn clone(&self) -> Self {
        Self {
            id: StoreId::fresh(),
            slots: self.slots.clone(),
            sentinel: self.sentinel,
        }
    }
}

/// Double-ended iterator over a half-open range of a container, yielding
/// each entry with its position.
pub struct Iter<'a, K, V> {
    store: &'a ElementStore<K, V>,
    front: SlotKey,
    back: SlotKey,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (Position, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let k = self.front;
        let slot = &self.store.slots[k];
        self.front = slot.next;
        let pos = self.store.position(k);
        slot.entry.as_ref().map(|(key, value)| (pos, key, value))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let k = self.store.slots[self.back].prev;
        self.back = k;
        let pos = self.store.position(k);
        self.store.slots[k]
            .entry
            .as_ref()
            .map(|(key, value)| (pos, key, value))
    }
}

/// Iterator over every entry of a container with mutable values.
pub struct IterMut<'a, K, V> {
    inner: Flatten<std::vec::IntoIter<Option<(Position, &'a K, &'a mut V)>>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (Position, &'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

/// Owning iterator over a container's `(key, value)` pairs in sequence
/// order.
pub struct IntoIter<K, V> {
    slots: SlotMap<SlotKey, Slot<K, V>>,
    front: SlotKey,
    back: SlotKey,
    // Links of taken slots are never repaired; the count stops both ends
    // before they could follow one.
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.slots.remove(self.front)?;
        self.front = slot.next;
        self.remaining -= 1;
        slot.entry
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.slots.remove(self.back)?;
        self.back = slot.prev;
        self.remaining -= 1;
        slot.entry
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
