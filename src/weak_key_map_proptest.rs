#![cfg(test)]

// Property tests for WeakKeyMap kept inside the crate so they can inspect
// both stores.

use crate::error::WeakMapError;
use crate::weak_key_map::{Placement, WeakKeyMap};
use proptest::prelude::*;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};
use std::rc::{Rc, Weak};

/// Folds every byte into one of four buckets so identity-hash collisions are
/// the common case rather than the exception.
#[derive(Clone, Debug, Default)]
struct BucketBuildHasher;
struct BucketHasher(u64);

impl BuildHasher for BucketBuildHasher {
    type Hasher = BucketHasher;
    fn build_hasher(&self) -> Self::Hasher {
        BucketHasher(0)
    }
}

impl Hasher for BucketHasher {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = self.0.wrapping_add(u64::from(*b));
        }
    }
    fn finish(&self) -> u64 {
        self.0 % 4
    }
}

#[derive(Clone, Debug)]
enum Op {
    Add(usize, i32),
    Remove(usize),
    Set(usize, i32),
    Get(usize),
    // Drop the only outside strong reference to a key.
    Release(usize),
    // Allocate a fresh key equal to a released one.
    Revive(usize),
    Clean,
    CleanKey(usize),
    Iterate,
    ToggleAutoClean,
}

fn name(i: usize) -> String {
    format!("k{i}")
}

fn arb_scenario() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=6).prop_flat_map(|n| {
        let idx = 0..n;
        let op = prop_oneof![
            4 => (idx.clone(), -2i32..=2).prop_map(|(i, v)| Op::Add(i, v)),
            2 => idx.clone().prop_map(Op::Remove),
            2 => (idx.clone(), -2i32..=2).prop_map(|(i, v)| Op::Set(i, v)),
            2 => idx.clone().prop_map(Op::Get),
            2 => idx.clone().prop_map(Op::Release),
            2 => idx.clone().prop_map(Op::Revive),
            1 => Just(Op::Clean),
            1 => idx.clone().prop_map(Op::CleanKey),
            1 => Just(Op::Iterate),
            1 => Just(Op::ToggleAutoClean),
        ];
        (Just(n), proptest::collection::vec(op, 1..80))
    })
}

// Property: state-machine equivalence against a model of live bindings.
// Invariants exercised across random operation sequences:
// - `add` places a new key in exactly one store; re-adding a weak key is a
//   no-op; re-adding a hard key succeeds only with an equal value.
// - Releasing the last outside reference to a weakly-held key unbinds it;
//   a hard-held key survives its release.
// - `remove`/`set` on unbound keys fail with `UnknownKey` and change nothing.
// - `len() == model + unswept dead entries` after every step; `clean`
//   leaves no dead entry behind.
// - Iteration yields exactly the model's bindings, once each.
// - `contains_key` sees bindings plus slots still held by unswept dead
//   entries.
// - No key ever resolves in both stores.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((n, ops) in arb_scenario()) {
        let mut m: WeakKeyMap<Weak<str>, i32, BucketBuildHasher> =
            WeakKeyMap::with_hasher(BucketBuildHasher);
        let mut holders: Vec<Option<Rc<str>>> =
            (0..n).map(|i| Some(Rc::from(name(i).as_str()))).collect();
        let mut model: HashMap<usize, (i32, Placement)> = HashMap::new();

        for op in ops {
            match op {
                Op::Add(i, v) => {
                    let Some(key) = holders[i].clone() else { continue };
                    let res = m.add(&key, v);
                    drop(key);
                    match model.get(&i).copied() {
                        Some((old, Placement::Hard)) if old == v => {
                            prop_assert_eq!(res, Ok(Placement::Hard));
                        }
                        Some((_, Placement::Hard)) => {
                            prop_assert_eq!(res, Err(WeakMapError::DuplicateKey));
                        }
                        Some((_, Placement::Weak)) => {
                            prop_assert_eq!(res, Ok(Placement::Weak));
                        }
                        None => {
                            prop_assert!(res.is_ok());
                            if let Ok(placement) = res {
                                model.insert(i, (v, placement));
                            }
                        }
                    }
                }
                Op::Remove(i) => {
                    let res = m.remove(name(i).as_str());
                    match model.remove(&i) {
                        Some((v, _)) => prop_assert_eq!(res, Ok(v)),
                        None => prop_assert_eq!(res, Err(WeakMapError::UnknownKey)),
                    }
                }
                Op::Set(i, v) => {
                    let res = m.set(name(i).as_str(), v);
                    match model.get_mut(&i) {
                        Some(binding) => {
                            prop_assert_eq!(res, Ok(()));
                            binding.0 = v;
                        }
                        None => prop_assert_eq!(res, Err(WeakMapError::UnknownKey)),
                    }
                }
                Op::Get(i) => {
                    let expected = model.get(&i).map(|(v, _)| *v);
                    prop_assert_eq!(m.get(name(i).as_str()).copied(), expected);
                }
                Op::Release(i) => {
                    holders[i] = None;
                    if let Some((_, Placement::Weak)) = model.get(&i) {
                        model.remove(&i);
                    }
                }
                Op::Revive(i) => {
                    if holders[i].is_none() {
                        holders[i] = Some(Rc::from(name(i).as_str()));
                    }
                }
                Op::Clean => {
                    m.clean();
                    prop_assert_eq!(m.unswept(), 0);
                }
                Op::CleanKey(i) => {
                    m.clean_key(name(i).as_str());
                }
                Op::Iterate => {
                    let pairs: Vec<(String, i32)> =
                        m.iter().map(|(k, v)| (k.to_string(), *v)).collect();
                    let seen: HashMap<String, i32> = pairs.iter().cloned().collect();
                    prop_assert_eq!(pairs.len(), seen.len(), "duplicate key yielded");
                    let expected: HashMap<String, i32> =
                        model.iter().map(|(i, (v, _))| (name(*i), *v)).collect();
                    prop_assert_eq!(seen, expected);
                }
                Op::ToggleAutoClean => {
                    let flag = m.auto_clean();
                    m.set_auto_clean(!flag);
                }
            }

            prop_assert!(m.is_partitioned());
            prop_assert_eq!(m.len(), model.len() + m.unswept());
            for i in 0..n {
                let k = name(i);
                let binding = model.get(&i).copied();
                // An occupied slot answers `true` until its dead entry is swept.
                prop_assert_eq!(
                    m.contains_key(k.as_str()),
                    binding.is_some() || m.slot_is_dead(k.as_str())
                );
                prop_assert_eq!(m.placement(k.as_str()), binding.map(|(_, p)| p));
                prop_assert_eq!(m.peek(k.as_str()).copied(), binding.map(|(v, _)| v));
            }
        }
    }
}
