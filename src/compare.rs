//! Key orderings for the ordered containers.
//!
//! A comparator answers "does `a` sort before `b`?" and must be a strict
//! weak ordering. Two keys are equivalent when neither sorts before the
//! other; the tree never calls `Eq`.

use core::borrow::Borrow;

pub trait Compare<T: ?Sized> {
    fn less(&self, a: &T, b: &T) -> bool;

    #[inline]
    fn equivalent(&self, a: &T, b: &T) -> bool {
        !self.less(a, b) && !self.less(b, a)
    }
}

/// Ascending order by `Ord`. The default comparator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Less;

/// Descending order by `Ord`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Greater;

impl<T: Ord + ?Sized> Compare<T> for Less {
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        a < b
    }
}

impl<T: Ord + ?Sized> Compare<T> for Greater {
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        a > b
    }
}

impl<T: ?Sized, F> Compare<T> for F
where
    F: Fn(&T, &T) -> bool,
{
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        self(a, b)
    }
}

/// Compare a stored key against a borrowed query with the same ordering.
#[inline]
pub(crate) fn query_less<K, Q, C>(cmp: &C, q: &Q, k: &K) -> bool
where
    K: Borrow<Q>,
    Q: ?Sized,
    C: Compare<Q> + ?Sized,
{
    cmp.less(q, k.borrow())
}

#[inline]
pub(crate) fn key_less<K, Q, C>(cmp: &C, k: &K, q: &Q) -> bool
where
    K: Borrow<Q>,
    Q: ?Sized,
    C: Compare<Q> + ?Sized,
{
    cmp.less(k.borrow(), q)
}
