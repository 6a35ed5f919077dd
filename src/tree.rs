//! Ordered index: a red-black tree over store slots.
//!
//! Nodes live in their own arena and carry only the `SlotKey` of the entry
//! they order; parent/child links are node keys, so rotations are plain key
//! reassignment. A secondary map from slot to node lets erasure start at the
//! right node without a key search.
//!
//! Invariants (checked by `validate` in tests):
//! - in-order traversal is sorted by the comparator;
//! - the root is black;
//! - a red node has no red child;
//! - every root-to-leaf path has the same number of black nodes.
//!
//! Equal keys descend to the right, so a duplicate is placed after the
//! existing run. The facade splices store slots at the matching spot, which
//! keeps the store sequence identical to the in-order traversal.

use crate::compare::{key_less, query_less, Compare};
use crate::store::{ElementStore, SlotKey};
use core::borrow::Borrow;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

new_key_type! {
    struct NodeKey;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Color {
    Red,
    Black,
}

#[derive(Clone, Debug)]
struct Node {
    slot: SlotKey,
    color: Color,
    parent: Option<NodeKey>,
    left: Option<NodeKey>,
    right: Option<NodeKey>,
}

#[derive(Clone, Debug, Default)]
pub struct TreeIndex<C> {
    cmp: C,
    nodes: SlotMap<NodeKey, Node>,
    by_slot: SecondaryMap<SlotKey, NodeKey>,
    root: Option<NodeKey>,
}

impl<C> TreeIndex<C> {
    pub(crate) fn new(cmp: C) -> Self {
        Self {
            cmp,
            nodes: SlotMap::with_key(),
            by_slot: SecondaryMap::new(),
            root: None,
        }
    }

    pub(crate) fn comparator(&self) -> &C {
        &self.cmp
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.by_slot.clear();
        self.root = None;
    }

    #[inline]
    fn color(&self, n: Option<NodeKey>) -> Color {
        n.map_or(Color::Black, |n| self.nodes[n].color)
    }

    #[inline]
    fn is_red(&self, n: Option<NodeKey>) -> bool {
        self.color(n) == Color::Red
    }

    #[inline]
    fn set_color(&mut self, n: NodeKey, color: Color) {
        self.nodes[n].color = color;
    }

    #[inline]
    fn is_left_child(&self, n: NodeKey, parent: NodeKey) -> bool {
        self.nodes[parent].left == Some(n)
    }

    fn sibling(&self, n: NodeKey, parent: NodeKey) -> Option<NodeKey> {
        if self.is_left_child(n, parent) {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        }
    }

    fn max_of(&self, mut n: NodeKey) -> NodeKey {
        while let Some(r) = self.nodes[n].right {
            n = r;
        }
        n
    }

    /// Hang `new` where `old` hangs now; `old`'s own links are untouched.
    fn replace_node(&mut self, old: NodeKey, new: Option<NodeKey>) {
        let parent = self.nodes[old].parent;
        match parent {
            None => self.root = new,
            Some(p) => {
                if self.is_left_child(old, p) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
        }
        if let Some(n) = new {
            self.nodes[n].parent = parent;
        }
    }

    fn rotate_left(&mut self, x: NodeKey) {
        let y = self.nodes[x]
            .right
            .expect("rotate_left needs a right child");
        self.replace_node(x, Some(y));
        let inner = self.nodes[y].left;
        self.nodes[x].right = inner;
        if let Some(i) = inner {
            self.nodes[i].parent = Some(x);
        }
        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
    }

    fn rotate_right(&mut self, x: NodeKey) {
        let y = self.nodes[x]
            .left
            .expect("rotate_right needs a left child");
        self.replace_node(x, Some(y));
        let inner = self.nodes[y].right;
        self.nodes[x].left = inner;
        if let Some(i) = inner {
            self.nodes[i].parent = Some(x);
        }
        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
    }

    /// Descend toward `q`. Returns the node holding an equivalent key, or the
    /// last node visited when there is none. Callers must check equivalence.
    pub(crate) fn nearest<K, V, Q>(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q>,
    {
        let mut n = self.root?;
        loop {
            let key = store.indexed_key(self.nodes[n].slot);
            let next = if query_less(&self.cmp, q, key) {
                self.nodes[n].left
            } else if key_less(&self.cmp, key, q) {
                self.nodes[n].right
            } else {
                break;
            };
            match next {
                Some(c) => n = c,
                None => break,
            }
        }
        Some(self.nodes[n].slot)
    }

    /// First slot whose key is not less than `q`.
    pub(crate) fn lower_bound<K, V, Q>(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q>,
    {
        let mut found = None;
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            if key_less(&self.cmp, store.indexed_key(node.slot), q) {
                cur = node.right;
            } else {
                found = Some(node.slot);
                cur = node.left;
            }
        }
        found
    }

    /// First slot whose key is greater than `q`.
    pub(crate) fn upper_bound<K, V, Q>(&self, store: &ElementStore<K, V>, q: &Q) -> Option<SlotKey>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q>,
    {
        let mut found = None;
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            if query_less(&self.cmp, q, store.indexed_key(node.slot)) {
                found = Some(node.slot);
                cur = node.left;
            } else {
                cur = node.right;
            }
        }
        found
    }

    /// Register a freshly spliced store slot.
    pub(crate) fn insert<K, V>(&mut self, store: &ElementStore<K, V>, slot: SlotKey)
    where
        C: Compare<K>,
    {
        let key = store.indexed_key(slot);
        let mut parent = None;
        let mut go_left = false;
        let mut cur = self.root;
        while let Some(n) = cur {
            parent = Some(n);
            go_left = self
                .cmp
                .less(key, store.indexed_key(self.nodes[n].slot));
            cur = if go_left {
                self.nodes[n].left
            } else {
                self.nodes[n].right
            };
        }

        let n = self.nodes.insert(Node {
            slot,
            color: Color::Red,
            parent,
            left: None,
            right: None,
        });
        self.by_slot.insert(slot, n);
        match parent {
            None => self.root = Some(n),
            Some(p) if go_left => self.nodes[p].left = Some(n),
            Some(p) => self.nodes[p].right = Some(n),
        }
        self.insert_fixup(n);
    }

    fn insert_fixup(&mut self, mut n: NodeKey) {
        loop {
            let Some(p) = self.nodes[n].parent else {
                self.set_color(n, Color::Black);
                return;
            };
            if self.nodes[p].color == Color::Black {
                return;
            }
            let g = self.nodes[p]
                .parent
                .expect("a red node is never the root");
            let uncle = self.sibling(p, g);
            if self.is_red(uncle) {
                let u = uncle.expect("a red uncle exists");
                self.set_color(p, Color::Black);
                self.set_color(u, Color::Black);
                self.set_color(g, Color::Red);
                n = g;
                continue;
            }

            // Black uncle: turn the inner grandchild case into the outer one.
            let mut n_cur = n;
            if !self.is_left_child(n, p) && self.is_left_child(p, g) {
                self.rotate_left(p);
                n_cur = p;
            } else if self.is_left_child(n, p) && !self.is_left_child(p, g) {
                self.rotate_right(p);
                n_cur = p;
            }

            let p = self.nodes[n_cur].parent.expect("outer case has a parent");
            let g = self.nodes[p].parent.expect("outer case has a grandparent");
            self.set_color(p, Color::Black);
            self.set_color(g, Color::Red);
            if self.is_left_child(n_cur, p) {
                self.rotate_right(g);
            } else {
                self.rotate_left(g);
            }
            return;
        }
    }

    /// Drop the node registered for `slot`. Returns false if the slot was not
    /// indexed.
    pub(crate) fn erase(&mut self, slot: SlotKey) -> bool {
        let Some(mut n) = self.by_slot.remove(slot) else {
            return false;
        };

        if let (Some(l), Some(_)) = (self.nodes[n].left, self.nodes[n].right) {
            // Take over the in-order predecessor's slot and remove its node.
            let pred = self.max_of(l);
            let pred_slot = self.nodes[pred].slot;
            self.nodes[n].slot = pred_slot;
            self.by_slot.insert(pred_slot, n);
            n = pred;
        }

        let child = self.nodes[n].left.or(self.nodes[n].right);
        if self.nodes[n].color == Color::Black && !self.is_red(child) {
            // Black leaf: fix the black height while it still stands in.
            self.erase_fixup(n);
        }
        self.replace_node(n, child);
        if let Some(c) = child {
            self.set_color(c, Color::Black);
        }
        self.nodes.remove(n);
        true
    }

    /// `n` is one black short on its path. Rebalance around it; `n` stays in
    /// place as a leaf throughout.
    fn erase_fixup(&mut self, mut n: NodeKey) {
        loop {
            let Some(p) = self.nodes[n].parent else {
                return;
            };
            let mut s = self
                .sibling(n, p)
                .expect("a black non-root node has a sibling");

            if self.nodes[s].color == Color::Red {
                self.set_color(p, Color::Red);
                self.set_color(s, Color::Black);
                if self.is_left_child(n, p) {
                    self.rotate_left(p);
                } else {
                    self.rotate_right(p);
                }
                s = self
                    .sibling(n, p)
                    .expect("rotation leaves a black sibling");
            }

            let near_far_black =
                !self.is_red(self.nodes[s].left) && !self.is_red(self.nodes[s].right);
            if near_far_black {
                self.set_color(s, Color::Red);
                if self.nodes[p].color == Color::Black {
                    n = p;
                    continue;
                }
                self.set_color(p, Color::Black);
                return;
            }

            let n_is_left = self.is_left_child(n, p);
            if n_is_left && !self.is_red(self.nodes[s].right) {
                let near = self.nodes[s].left.expect("red near nephew");
                self.set_color(s, Color::Red);
                self.set_color(near, Color::Black);
                self.rotate_right(s);
                s = self.nodes[p].right.expect("rotation keeps a sibling");
            } else if !n_is_left && !self.is_red(self.nodes[s].left) {
                let near = self.nodes[s].right.expect("red near nephew");
                self.set_color(s, Color::Red);
                self.set_color(near, Color::Black);
                self.rotate_left(s);
                s = self.nodes[p].left.expect("rotation keeps a sibling");
            }

            let parent_color = self.nodes[p].color;
            self.set_color(s, parent_color);
            self.set_color(p, Color::Black);
            if n_is_left {
                let far = self.nodes[s].right.expect("red far nephew");
                self.set_color(far, Color::Black);
                self.rotate_left(p);
            } else {
                let far = self.nodes[s].left.expect("red far nephew");
                self.set_color(far, Color::Black);
                self.rotate_right(p);
            }
            return;
        }
    }

    #[cfg(test)]
    pub(crate) fn height(&self) -> usize {
        fn go(t: &SlotMap<NodeKey, Node>, n: Option<NodeKey>) -> usize {
            n.map_or(0, |n| 1 + go(t, t[n].left).max(go(t, t[n].right)))
        }
        go(&self.nodes, self.root)
    }

    /// Check every red-black and ordering invariant, and that the in-order
    /// traversal matches the store sequence slot for slot.
    #[cfg(test)]
    pub(crate) fn validate<K, V>(&self, store: &ElementStore<K, V>) -> Result<(), String>
    where
        C: Compare<K>,
    {
        if self.is_red(self.root) {
            return Err("root is red".into());
        }
        if self.nodes.len() != store.len() || self.by_slot.len() != store.len() {
            return Err(format!(
                "tree has {} nodes, {} slot links, store has {} entries",
                self.nodes.len(),
                self.by_slot.len(),
                store.len()
            ));
        }
        self.black_height(self.root, None)?;

        let mut in_order = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut cur = self.root;
        while cur.is_some() || !stack.is_empty() {
            while let Some(n) = cur {
                stack.push(n);
                cur = self.nodes[n].left;
            }
            let n = stack.pop().expect("stack is non-empty");
            if self.by_slot.get(self.nodes[n].slot) != Some(&n) {
                return Err("slot link does not point back at its node".into());
            }
            in_order.push(self.nodes[n].slot);
            cur = self.nodes[n].right;
        }

        for w in in_order.windows(2) {
            if self
                .cmp
                .less(store.indexed_key(w[1]), store.indexed_key(w[0]))
            {
                return Err("in-order traversal is out of order".into());
            }
        }
        let mut k = store.begin();
        for &slot in &in_order {
            if k != slot {
                return Err("store sequence differs from in-order traversal".into());
            }
            k = store.next(k);
        }
        Ok(())
    }

    #[cfg(test)]
    fn black_height(&self, n: Option<NodeKey>, parent: Option<NodeKey>) -> Result<usize, String> {
        let Some(n) = n else {
            return Ok(1);
        };
        let node = &self.nodes[n];
        if node.parent != parent {
            return Err("parent link mismatch".into());
        }
        if node.color == Color::Red && (self.is_red(node.left) || self.is_red(node.right)) {
            return Err("red node has a red child".into());
        }
        let l = self.black_height(node.left, Some(n))?;
        let r = self.black_height(node.right, Some(n))?;
        if l != r {
            return Err(format!("black height differs: {} vs {}", l, r));
        }
        Ok(l + usize::from(node.color == Color::Black))
    }
}
