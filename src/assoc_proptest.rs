#![cfg(test)]

// Property tests for Assoc kept inside the crate so they can check index
// internals (red-black shape, bucket placement) after every operation.

use crate::assoc::{Assoc, Multi, Unique};
use crate::compare::Less;
use crate::error::Error;
use crate::hash_index::HashIndex;
use crate::index::{KeyIndex, KeyLookup};
use crate::store::Position;
use crate::tree::TreeIndex;
use hashbrown::hash_map::DefaultHashBuilder;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations shrink well: indices shrink toward earlier keys,
// the pool shrinks, and the op list shrinks in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    InsertWith(usize, i32),
    EraseKey(usize),
    EraseAt(usize),
    Extract(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    Poke(usize),
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,4}", 1..=10).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::InsertWith(i, v)),
            3 => idx.clone().prop_map(Op::EraseKey),
            2 => any::<usize>().prop_map(Op::EraseAt),
            2 => idx.clone().prop_map(Op::Extract),
            2 => idx.clone().prop_map(Op::Find),
            1 => prop_oneof![contains_pool, "[a-z]{0,4}"].prop_map(Op::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => (0usize..200).prop_map(Op::Poke),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

type Check<'a, M> = &'a dyn Fn(&M) -> Result<(), String>;
type Poke<'a, M> = &'a dyn Fn(&mut M, usize) -> Result<(), String>;

// State machine for unique-key containers against a Vec model kept in
// insertion order.
// Invariants exercised after every op:
// - duplicate inserts return the existing position with `false`;
// - `find`/`count`/`contains_key` parity with the model;
// - every live position resolves to its own entry, every erased one is stale;
// - iteration is sorted (ordered) or insertion order (hashed);
// - the index's internal invariants hold.
fn run_unique<I>(
    mut sut: Assoc<Key, i32, I, Unique>,
    pool: &[String],
    ops: Vec<Op>,
    sorted: bool,
    check: Check<'_, Assoc<Key, i32, I, Unique>>,
    poke: Poke<'_, Assoc<Key, i32, I, Unique>>,
) -> Result<(), TestCaseError>
where
    I: KeyIndex<Key, i32> + KeyLookup<Key, i32, Key> + KeyLookup<Key, i32, str>,
{
    let mut model: Vec<(Key, i32)> = Vec::new();
    let mut live: HashMap<Key, Position> = HashMap::new();
    let mut stale: Vec<Position> = Vec::new();
    let calls = Cell::new(0usize);

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_from(pool, i);
                let (pos, fresh) = sut.insert(k.clone(), v);
                match live.get(&k) {
                    Some(&p) => {
                        prop_assert!(!fresh, "duplicate insert must not create");
                        prop_assert_eq!(pos, p);
                    }
                    None => {
                        prop_assert!(fresh);
                        live.insert(k.clone(), pos);
                        model.push((k, v));
                    }
                }
            }
            Op::InsertWith(i, v) => {
                let k = key_from(pool, i);
                let before = calls.get();
                let (pos, fresh) = sut.insert_with(k.clone(), || {
                    calls.set(calls.get() + 1);
                    v
                });
                if live.contains_key(&k) {
                    prop_assert!(!fresh);
                    prop_assert_eq!(calls.get(), before, "value built for a duplicate");
                } else {
                    prop_assert!(fresh);
                    prop_assert_eq!(calls.get(), before + 1);
                    live.insert(k.clone(), pos);
                    model.push((k, v));
                }
            }
            Op::EraseKey(i) => {
                let k = key_from(pool, i);
                let n = sut.erase(&k);
                match live.remove(&k) {
                    Some(p) => {
                        prop_assert_eq!(n, 1);
                        stale.push(p);
                        model.retain(|(mk, _)| mk != &k);
                    }
                    None => prop_assert_eq!(n, 0),
                }
            }
            Op::Extract(i) => {
                let k = key_from(pool, i);
                let got = sut.extract(k.0.as_str());
                match live.remove(&k) {
                    Some(p) => {
                        let at = model
                            .iter()
                            .position(|(mk, _)| mk == &k)
                            .expect("model entry present");
                        prop_assert_eq!(got, Some(model.remove(at)));
                        stale.push(p);
                    }
                    None => prop_assert_eq!(got, None),
                }
            }
            Op::EraseAt(r) => {
                if model.is_empty() {
                    prop_assert_eq!(sut.erase_at(sut.end()), Err(Error::EndPosition));
                } else {
                    let (k, _) = model.remove(r % model.len());
                    let p = live.remove(&k).expect("model entry is live");
                    let next = sut.erase_at(p);
                    prop_assert!(next.is_ok());
                    stale.push(p);
                }
            }
            Op::Find(i) => {
                let k = key_from(pool, i);
                let p = sut.find(&k);
                match live.get(&k) {
                    Some(&lp) => {
                        prop_assert_eq!(p, lp);
                        prop_assert_eq!(sut.count(&k), 1);
                    }
                    None => {
                        prop_assert_eq!(p, sut.end());
                        prop_assert_eq!(sut.count(&k), 0);
                    }
                }
            }
            Op::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                prop_assert_eq!(has, live.keys().any(|k| k.0 == s));
            }
            Op::Mutate(i, d) => {
                let k = key_from(pool, i);
                if let Some(&p) = live.get(&k) {
                    let v = sut.value_mut(p).expect("live position resolves");
                    *v = v.wrapping_add(d);
                    let mv = model
                        .iter_mut()
                        .find(|(mk, _)| mk == &k)
                        .expect("model entry present");
                    mv.1 = mv.1.wrapping_add(d);
                }
            }
            Op::Poke(n) => poke(&mut sut, n).map_err(TestCaseError::fail)?,
            Op::Clear => {
                sut.clear();
                stale.extend(live.drain().map(|(_, p)| p));
                model.clear();
            }
        }

        check(&sut).map_err(TestCaseError::fail)?;
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        for &p in &stale {
            prop_assert_eq!(sut.value(p), Err(Error::StalePosition));
        }
        for (k, v) in &model {
            prop_assert_eq!(sut.entry(live[k]), Ok((k, v)));
        }
        let got: Vec<(Key, i32)> = sut.iter().map(|(_, k, v)| (k.clone(), *v)).collect();
        let mut expected = model.clone();
        if sorted {
            expected.sort_by(|a, b| a.0.cmp(&b.0));
        }
        prop_assert_eq!(got, expected);
    }
    Ok(())
}

// State machine for multi-key containers. The model is a Vec of
// (key, value, position) in insertion order.
// Invariants exercised after every op:
// - inserts always create; equal keys keep insertion order;
// - `find` returns the earliest surviving entry of the key;
// - `count`/`erase(key)` cover exactly the equal entries;
// - positions stay valid until erased, stale afterwards.
fn run_multi<I>(
    mut sut: Assoc<Key, i32, I, Multi>,
    pool: &[String],
    ops: Vec<Op>,
    sorted: bool,
    check: Check<'_, Assoc<Key, i32, I, Multi>>,
    poke: Poke<'_, Assoc<Key, i32, I, Multi>>,
) -> Result<(), TestCaseError>
where
    I: KeyIndex<Key, i32> + KeyLookup<Key, i32, Key> + KeyLookup<Key, i32, str>,
{
    let mut model: Vec<(Key, i32, Position)> = Vec::new();
    let mut stale: Vec<Position> = Vec::new();

    for op in ops {
        match op {
            Op::Insert(i, v) | Op::InsertWith(i, v) => {
                let k = key_from(pool, i);
                let (pos, fresh) = sut.insert_with(k.clone(), || v);
                prop_assert!(fresh, "multi containers always insert");
                model.push((k, v, pos));
            }
            Op::EraseKey(i) => {
                let k = key_from(pool, i);
                let expected = model.iter().filter(|(mk, _, _)| mk == &k).count();
                prop_assert_eq!(sut.erase(&k), expected);
                stale.extend(model.iter().filter(|(mk, _, _)| mk == &k).map(|e| e.2));
                model.retain(|(mk, _, _)| mk != &k);
            }
            Op::Extract(i) => {
                // The earliest surviving entry of the key goes.
                let k = key_from(pool, i);
                let got = sut.extract(&k);
                match model.iter().position(|(mk, _, _)| mk == &k) {
                    Some(at) => {
                        let (mk, mv, p) = model.remove(at);
                        prop_assert_eq!(got, Some((mk, mv)));
                        stale.push(p);
                    }
                    None => prop_assert_eq!(got, None),
                }
            }
            Op::EraseAt(r) => {
                if model.is_empty() {
                    prop_assert_eq!(sut.erase_at(sut.end()), Err(Error::EndPosition));
                } else {
                    let (_, _, p) = model.remove(r % model.len());
                    prop_assert!(sut.erase_at(p).is_ok());
                    stale.push(p);
                }
            }
            Op::Find(i) => {
                let k = key_from(pool, i);
                let first = model.iter().find(|(mk, _, _)| mk == &k).map(|e| e.2);
                prop_assert_eq!(sut.find(&k), first.unwrap_or(sut.end()));
                let n = model.iter().filter(|(mk, _, _)| mk == &k).count();
                prop_assert_eq!(sut.count(&k), n);
            }
            Op::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                prop_assert_eq!(has, model.iter().any(|(k, _, _)| k.0 == s));
            }
            Op::Mutate(i, d) => {
                let k = key_from(pool, i);
                for e in model.iter_mut().filter(|(mk, _, _)| mk == &k) {
                    let v = sut.value_mut(e.2).expect("live position resolves");
                    *v = v.wrapping_add(d);
                    e.1 = e.1.wrapping_add(d);
                }
            }
            Op::Poke(n) => poke(&mut sut, n).map_err(TestCaseError::fail)?,
            Op::Clear => {
                sut.clear();
                stale.extend(model.drain(..).map(|e| e.2));
            }
        }

        check(&sut).map_err(TestCaseError::fail)?;
        prop_assert_eq!(sut.len(), model.len());
        for &p in &stale {
            prop_assert_eq!(sut.key(p), Err(Error::StalePosition));
        }
        for (k, v, p) in &model {
            prop_assert_eq!(sut.entry(*p), Ok((k, v)));
        }
        let got: Vec<Position> = sut.iter().map(|(p, _, _)| p).collect();
        let mut expected: Vec<(Key, Position)> =
            model.iter().map(|(k, _, p)| (k.clone(), *p)).collect();
        if sorted {
            // Stable: equal keys stay in insertion order.
            expected.sort_by(|a, b| a.0.cmp(&b.0));
        }
        let expected: Vec<Position> = expected.into_iter().map(|(_, p)| p).collect();
        prop_assert_eq!(got, expected);
    }
    Ok(())
}

fn tree_poke<P: crate::assoc::Policy>(
    m: &mut Assoc<Key, i32, TreeIndex<Less>, P>,
    n: usize,
) -> Result<(), String> {
    // Bounds around a query key must bracket it.
    let q = Key(((b'a' + (n % 26) as u8) as char).to_string());
    let lb = m.lower_bound(&q);
    if lb != m.end() && m.key(lb).map_err(|e| e.to_string())? < &q {
        return Err("lower_bound below query".into());
    }
    if lb != m.begin() {
        let before = m.prev(lb).map_err(|e| e.to_string())?;
        if m.key(before).map_err(|e| e.to_string())? >= &q {
            return Err("lower_bound is not the first candidate".into());
        }
    }
    let ub = m.upper_bound(&q);
    if ub != m.end() && m.key(ub).map_err(|e| e.to_string())? <= &q {
        return Err("upper_bound not above query".into());
    }
    Ok(())
}

fn hash_poke<S: BuildHasher, P: crate::assoc::Policy>(
    m: &mut Assoc<Key, i32, HashIndex<S>, P>,
    n: usize,
) -> Result<(), String> {
    m.rehash(n);
    if m.bucket_count() < n.max(crate::MIN_BUCKET_COUNT) {
        return Err(format!("rehash({}) left {} buckets", n, m.bucket_count()));
    }
    Ok(())
}

fn tree_check<P>(m: &Assoc<Key, i32, TreeIndex<Less>, P>) -> Result<(), String> {
    m.check_invariants()?;
    // 2 * log2(n + 1) bound on red-black height.
    let bound = 2.0 * ((m.len() + 1) as f64).log2();
    if m.tree_height() as f64 > bound + 1e-9 {
        return Err(format!("height {} exceeds {}", m.tree_height(), bound));
    }
    Ok(())
}

fn hash_check<S: BuildHasher, P>(m: &Assoc<Key, i32, HashIndex<S>, P>) -> Result<(), String> {
    m.check_invariants()?;
    if m.load_factor() > m.max_load_factor() {
        return Err(format!(
            "load factor {} above {}",
            m.load_factor(),
            m.max_load_factor()
        ));
    }
    Ok(())
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_tree_unique((pool, ops) in arb_scenario()) {
        let sut: Assoc<Key, i32, TreeIndex<Less>, Unique> = Assoc::with_comparator(Less);
        run_unique(sut, &pool, ops, true, &tree_check::<Unique>, &tree_poke::<Unique>)?;
    }

    #[test]
    fn prop_tree_multi((pool, ops) in arb_scenario()) {
        let sut: Assoc<Key, i32, TreeIndex<Less>, Multi> = Assoc::with_comparator(Less);
        run_multi(sut, &pool, ops, true, &tree_check::<Multi>, &tree_poke::<Multi>)?;
    }

    #[test]
    fn prop_hash_unique((pool, ops) in arb_scenario()) {
        let sut: Assoc<Key, i32, HashIndex<DefaultHashBuilder>, Unique> =
            Assoc::with_hasher(DefaultHashBuilder::default());
        run_unique(
            sut,
            &pool,
            ops,
            false,
            &hash_check::<DefaultHashBuilder, Unique>,
            &hash_poke::<DefaultHashBuilder, Unique>,
        )?;
    }

    #[test]
    fn prop_hash_multi((pool, ops) in arb_scenario()) {
        let sut: Assoc<Key, i32, HashIndex<DefaultHashBuilder>, Multi> =
            Assoc::with_hasher(DefaultHashBuilder::default());
        run_multi(
            sut,
            &pool,
            ops,
            false,
            &hash_check::<DefaultHashBuilder, Multi>,
            &hash_poke::<DefaultHashBuilder, Multi>,
        )?;
    }

    // Same invariants under worst-case collisions: every entry shares one
    // hash, so lookups rely entirely on equality.
    #[test]
    fn prop_hash_unique_with_collisions((pool, ops) in arb_scenario()) {
        let sut: Assoc<Key, i32, HashIndex<ConstBuildHasher>, Unique> =
            Assoc::with_hasher(ConstBuildHasher);
        run_unique(
            sut,
            &pool,
            ops,
            false,
            &hash_check::<ConstBuildHasher, Unique>,
            &hash_poke::<ConstBuildHasher, Unique>,
        )?;
    }

    #[test]
    fn prop_hash_multi_with_collisions((pool, ops) in arb_scenario()) {
        let sut: Assoc<Key, i32, HashIndex<ConstBuildHasher>, Multi> =
            Assoc::with_hasher(ConstBuildHasher);
        run_multi(
            sut,
            &pool,
            ops,
            false,
            &hash_check::<ConstBuildHasher, Multi>,
            &hash_poke::<ConstBuildHasher, Multi>,
        )?;
    }
}

// Erasing every key in any order empties the container and resets the index.
proptest! {
    #[test]
    fn prop_erase_all_in_any_order(keys in proptest::collection::vec(0u16..500, 0..200), seed in any::<u64>()) {
        let mut tree: Assoc<u16, (), TreeIndex<Less>, Multi> = Assoc::from_keys(keys.iter().copied());
        let mut hash: Assoc<u16, (), HashIndex<DefaultHashBuilder>, Multi> = Assoc::from_keys(keys.iter().copied());

        let mut order = keys.clone();
        // Fisher-Yates driven by a small LCG so proptest controls the order.
        let mut s = seed;
        for i in (1..order.len()).rev() {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            let j = (s >> 33) as usize % (i + 1);
            order.swap(i, j);
        }
        for k in order {
            tree.erase(&k);
            hash.erase(&k);
            tree.check_invariants().map_err(TestCaseError::fail)?;
            hash.check_invariants().map_err(TestCaseError::fail)?;
        }
        prop_assert!(tree.is_empty());
        prop_assert!(hash.is_empty());
        prop_assert_eq!(tree.begin(), tree.end());
        prop_assert_eq!(tree.tree_height(), 0);
        prop_assert!(hash.iter().next().is_none());
    }
}

// Merging into a unique container ends where inserting the target's pairs
// and then the source's would, and leaves behind exactly the source keys
// the target already held.
proptest! {
    #[test]
    fn prop_merge_matches_sequential_insert(
        left in proptest::collection::vec((0u8..40, any::<i32>()), 0..60),
        right in proptest::collection::vec((0u8..40, any::<i32>()), 0..60),
    ) {
        let both = || left.iter().chain(&right).copied();

        let mut tree: Assoc<u8, i32, TreeIndex<Less>, Unique> = Assoc::from_entries(left.iter().copied());
        let mut tree_src: Assoc<u8, i32, TreeIndex<Less>, Unique> = Assoc::from_entries(right.iter().copied());
        let tree_want: Assoc<u8, i32, TreeIndex<Less>, Unique> = Assoc::from_entries(both());
        let before = tree_src.len();
        let moved = tree.merge(&mut tree_src);
        prop_assert_eq!(moved + tree_src.len(), before);
        prop_assert_eq!(
            tree.iter().map(|(_, k, v)| (*k, *v)).collect::<Vec<_>>(),
            tree_want.iter().map(|(_, k, v)| (*k, *v)).collect::<Vec<_>>()
        );
        for k in tree_src.keys() {
            prop_assert!(tree.contains_key(k));
        }
        tree.check_invariants().map_err(TestCaseError::fail)?;
        tree_src.check_invariants().map_err(TestCaseError::fail)?;

        let mut hash: Assoc<u8, i32, HashIndex<DefaultHashBuilder>, Unique> = Assoc::from_entries(left.iter().copied());
        let mut hash_src: Assoc<u8, i32, HashIndex<DefaultHashBuilder>, Unique> = Assoc::from_entries(right.iter().copied());
        let hash_want: Assoc<u8, i32, HashIndex<DefaultHashBuilder>, Unique> = Assoc::from_entries(both());
        hash.merge(&mut hash_src);
        prop_assert_eq!(
            hash.iter().map(|(_, k, v)| (*k, *v)).collect::<Vec<_>>(),
            hash_want.iter().map(|(_, k, v)| (*k, *v)).collect::<Vec<_>>()
        );
        prop_assert_eq!(hash.len() + hash_src.len(), tree.len() + tree_src.len());
        hash.check_invariants().map_err(TestCaseError::fail)?;
        hash_src.check_invariants().map_err(TestCaseError::fail)?;
    }
}
