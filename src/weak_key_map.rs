//! WeakKeyMap: weak store over a strong fallback store.
//!
//! The weak store is indexed by the key's identity hash alone, one entry per
//! hash. A key whose hash is already taken by a different key goes to the
//! hard store, which compares full keys and holds them strongly.

use crate::builder::WeakKeyMapBuilder;
use crate::dispose::{Disposal, Retain};
use crate::entry::WeakEntry;
use crate::error::{Result, WeakMapError};
use crate::store::{self, Store};
use crate::weak_ref::{key_of, WeakKey};
use core::fmt;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;
use tracing::{debug, trace, warn};

/// Which store a key lives in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Placement {
    /// Held through a weak reference; reclaimed with its key.
    Weak,
    /// Held strongly after an identity-hash collision. Stays until removed.
    Hard,
}

/// A map that does not keep its keys alive.
///
/// Keys are passed in as strong pointers (`Rc<T>`, `Arc<T>`) and stored as
/// the matching weak pointer `W`. Once the last strong owner drops a key its
/// entry is dead; dead entries keep counting towards [`len`](Self::len) until
/// a sweep removes them. Sweeps run before `add`/`get` on the touched slot and
/// before iteration while auto-clean is on, and on demand through
/// [`clean`](Self::clean).
///
/// Two distinct keys with the same identity hash cannot share the weak store:
/// the second one is kept in the hard store, strongly, until removed.
pub struct WeakKeyMap<W: WeakKey, V, S = RandomState, D = Retain> {
    hasher: S,
    weak: Store<u64, WeakEntry<W, V>, S>,
    hard: Store<W::Strong, V, S>,
    auto_clean: bool,
    disposal: D,
}

impl<W: WeakKey, V> WeakKeyMap<W, V> {
    pub fn new() -> Self {
        WeakKeyMapBuilder::new().build()
    }
}

impl<W: WeakKey, V> Default for WeakKeyMap<W, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, V, S, D> WeakKeyMap<W, V, S, D>
where
    W: WeakKey,
    S: BuildHasher + Clone,
    D: Disposal<W::Key, V>,
{
    pub(crate) fn from_parts(hasher: S, disposal: D, auto_clean: bool) -> Self {
        Self {
            weak: Store::with_hasher(hasher.clone()),
            hard: Store::with_hasher(hasher.clone()),
            hasher,
            auto_clean,
            disposal,
        }
    }

    pub fn with_hasher(hasher: S) -> Self
    where
        D: Default,
    {
        Self::from_parts(hasher, D::default(), true)
    }

    fn identity_hash(&self, key: &W::Key) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Entries in both stores, including dead weak entries not yet swept.
    pub fn len(&self) -> usize {
        self.weak.len() + self.hard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weak_len(&self) -> usize {
        self.weak.len()
    }

    pub fn hard_len(&self) -> usize {
        self.hard.len()
    }

    pub fn auto_clean(&self) -> bool {
        self.auto_clean
    }

    pub fn set_auto_clean(&mut self, auto_clean: bool) {
        self.auto_clean = auto_clean;
    }

    /// Bind `key` to `value` without taking ownership of the key.
    ///
    /// - A key already held strongly succeeds only if `value` equals the
    ///   stored value; otherwise [`WeakMapError::DuplicateKey`].
    /// - A free identity-hash slot stores the key weakly.
    /// - A slot already holding an equal key is left alone; the stored value
    ///   is not replaced.
    /// - Any other occupant (a different key, or a dead one not yet swept)
    ///   sends the key to the hard store.
    pub fn add(&mut self, key: &W::Strong, value: V) -> Result<Placement>
    where
        V: PartialEq,
    {
        let k = key_of::<W>(key);
        let hash = self.identity_hash(k);

        if let Some(existing) = self.hard.get(k) {
            if *existing == value {
                return Ok(Placement::Hard);
            }
            warn!(hash, "key is already registered");
            return Err(WeakMapError::DuplicateKey);
        }

        if self.auto_clean {
            self.clean_slot(hash);
        }

        match self.weak.get(&hash) {
            None => {
                return self
                    .weak
                    .try_insert(hash, WeakEntry::new(key, value))
                    .map(|_| Placement::Weak)
                    .map_err(|_| WeakMapError::DuplicateKey);
            }
            Some(entry) if entry.matches(k) => {
                trace!(hash, "key is already weakly registered");
                return Ok(Placement::Weak);
            }
            Some(_) => {}
        }

        match self.hard.try_insert(key.clone(), value) {
            Ok(_) => {
                debug!(hash, "identity hash collision, key is hard referenced");
                Ok(Placement::Hard)
            }
            Err(_) => {
                warn!(hash, "key is already registered");
                Err(WeakMapError::DuplicateKey)
            }
        }
    }

    /// Unbind `key` and hand its value back. The value is not disposed.
    pub fn remove(&mut self, key: &W::Key) -> Result<V> {
        let hash = self.identity_hash(key);
        if self.weak_hit(hash, key) {
            if let Some(value) = self
                .weak
                .remove_key(&hash)
                .and_then(|(_, entry)| entry.into_value())
            {
                return Ok(value);
            }
        }
        if let Some((_, value)) = self.hard.remove_key(key) {
            return Ok(value);
        }
        warn!(hash, "key is not registered");
        Err(WeakMapError::UnknownKey)
    }

    /// Look `key` up, sweeping its weak slot first when auto-clean is on.
    pub fn get(&mut self, key: &W::Key) -> Option<&V> {
        let hash = self.identity_hash(key);
        if self.auto_clean {
            self.clean_slot(hash);
        }
        self.lookup(hash, key)
    }

    /// Like [`get`](Self::get), without sweeping.
    pub fn peek(&self, key: &W::Key) -> Option<&V> {
        self.lookup(self.identity_hash(key), key)
    }

    pub fn get_mut(&mut self, key: &W::Key) -> Option<&mut V> {
        let hash = self.identity_hash(key);
        if self.auto_clean {
            self.clean_slot(hash);
        }
        if self.weak_hit(hash, key) {
            return self.weak.get_mut(&hash).and_then(WeakEntry::value_mut);
        }
        self.hard.get_mut(key)
    }

    /// Overwrite the value bound to `key`. Never creates a binding.
    pub fn set(&mut self, key: &W::Key, value: V) -> Result<()> {
        if let Some(slot) = self.hard.get_mut(key) {
            *slot = value;
            return Ok(());
        }
        let hash = self.identity_hash(key);
        match self.weak.get_mut(&hash) {
            Some(entry) if entry.matches(key) => {
                entry.set_value(value);
                Ok(())
            }
            _ => {
                warn!(hash, "there is no entry for key");
                Err(WeakMapError::UnknownKey)
            }
        }
    }

    /// Whether `key` has an entry. Never sweeps and never re-checks liveness.
    ///
    /// A weak slot counts while it is occupied: an entry whose key died but
    /// has not been swept still answers `true`, the same entry [`len`](Self::len)
    /// still counts.
    pub fn contains_key(&self, key: &W::Key) -> bool {
        if self.hard.contains_key(key) {
            return true;
        }
        self.weak
            .get(&self.identity_hash(key))
            .map(|entry| !entry.is_alive() || entry.matches(key))
            .unwrap_or(false)
    }

    pub fn placement(&self, key: &W::Key) -> Option<Placement> {
        if self.weak_hit(self.identity_hash(key), key) {
            Some(Placement::Weak)
        } else if self.hard.contains_key(key) {
            Some(Placement::Hard)
        } else {
            None
        }
    }

    /// Drop every entry. No disposal cascade runs.
    pub fn clear(&mut self) {
        let entries = self.len();
        self.weak.clear();
        self.hard.clear();
        debug!(entries, "cleared map");
    }

    /// Sweep both stores.
    ///
    /// Weak entries whose key is gone (or released by the disposal policy)
    /// are disposed and removed. Hard entries whose key is released have
    /// their value disposed and are removed. Returns whether anything was
    /// removed.
    pub fn clean(&mut self) -> bool {
        let disposal = &self.disposal;
        let dead = self.weak.extract_if(|_, entry| Self::is_dead(disposal, entry));
        let released = self
            .hard
            .extract_if(|key, _| disposal.is_released(key_of::<W>(key)));

        let (weak_swept, hard_swept) = (dead.len(), released.len());
        for (_, mut entry) in dead {
            entry.dispose(disposal);
        }
        for (_, value) in released {
            disposal.dispose_value(&value);
        }
        if weak_swept + hard_swept > 0 {
            trace!(weak_swept, hard_swept, "swept map");
        }
        weak_swept + hard_swept > 0
    }

    /// Sweep only the weak slot `key` hashes to.
    pub fn clean_key(&mut self, key: &W::Key) -> bool {
        let hash = self.identity_hash(key);
        self.clean_slot(hash)
    }

    /// Run the disposal cascade on every entry and leave the map empty.
    /// Keys the policy already reports as released are not disposed again.
    pub fn dispose(&mut self) {
        let disposal = &self.disposal;
        let mut entries = 0usize;
        for (_, mut entry) in self.weak.drain() {
            entry.dispose(disposal);
            entries += 1;
        }
        for (key, value) in self.hard.drain() {
            let k = key_of::<W>(&key);
            if !disposal.is_released(k) {
                disposal.dispose_key(k);
            }
            disposal.dispose_value(&value);
            entries += 1;
        }
        debug!(entries, "disposed map");
    }

    /// Every live binding: weak entries first, then hard entries.
    ///
    /// Runs [`clean`](Self::clean) first when auto-clean is on. Weak entries
    /// whose key is gone by the time they are reached are skipped.
    pub fn iter(&mut self) -> Iter<'_, W, V> {
        if self.auto_clean {
            self.clean();
        }
        Iter {
            weak: self.weak.iter(),
            hard: self.hard.iter(),
        }
    }

    pub fn keys(&mut self) -> Keys<'_, W, V> {
        Keys(self.iter())
    }

    pub fn values(&mut self) -> Values<'_, W, V> {
        Values(self.iter())
    }

    fn lookup(&self, hash: u64, key: &W::Key) -> Option<&V> {
        match self.weak.get(&hash) {
            Some(entry) if entry.matches(key) => entry.value(),
            _ => self.hard.get(key),
        }
    }

    fn weak_hit(&self, hash: u64, key: &W::Key) -> bool {
        self.weak
            .get(&hash)
            .map(|entry| entry.matches(key))
            .unwrap_or(false)
    }

    fn is_dead(disposal: &D, entry: &WeakEntry<W, V>) -> bool {
        match entry.key() {
            Some(key) => disposal.is_released(key_of::<W>(&key)),
            None => true,
        }
    }

    fn clean_slot(&mut self, hash: u64) -> bool {
        let dead = self
            .weak
            .get(&hash)
            .map(|entry| Self::is_dead(&self.disposal, entry))
            .unwrap_or(false);
        if !dead {
            return false;
        }
        match self.weak.remove_key(&hash) {
            Some((_, mut entry)) => {
                entry.dispose(&self.disposal);
                trace!(hash, "swept dead weak entry");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
impl<W, V, S, D> WeakKeyMap<W, V, S, D>
where
    W: WeakKey,
    S: BuildHasher + Clone,
    D: Disposal<W::Key, V>,
{
    /// Weak entries whose key is gone but which have not been swept yet.
    pub(crate) fn unswept(&self) -> usize {
        self.weak
            .iter()
            .filter(|(_, entry)| !entry.is_alive())
            .count()
    }

    /// Whether the weak slot `key` hashes to holds a dead entry not yet
    /// swept.
    pub(crate) fn slot_is_dead(&self, key: &W::Key) -> bool {
        self.weak
            .get(&self.identity_hash(key))
            .map(|entry| !entry.is_alive())
            .unwrap_or(false)
    }

    /// No key resolves in both stores at once.
    pub(crate) fn is_partitioned(&self) -> bool {
        self.hard.iter().all(|(key, _)| {
            let k = key_of::<W>(key);
            !self.weak_hit(self.identity_hash(k), k)
        })
    }
}

impl<W, V, S, D> fmt::Debug for WeakKeyMap<W, V, S, D>
where
    W: WeakKey,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakKeyMap")
            .field("weak", &self.weak.len())
            .field("hard", &self.hard.len())
            .field("auto_clean", &self.auto_clean)
            .finish()
    }
}

impl<'a, W, V, S, D> Extend<(&'a W::Strong, V)> for WeakKeyMap<W, V, S, D>
where
    W: WeakKey,
    W::Strong: 'a,
    V: PartialEq,
    S: BuildHasher + Clone,
    D: Disposal<W::Key, V>,
{
    /// Failed adds are reported through their diagnostics and skipped.
    fn extend<I: IntoIterator<Item = (&'a W::Strong, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            if let Err(error) = self.add(key, value) {
                trace!(%error, "skipped pair while extending");
            }
        }
    }
}

impl<'a, W, V, S, D> IntoIterator for &'a mut WeakKeyMap<W, V, S, D>
where
    W: WeakKey,
    S: BuildHasher + Clone,
    D: Disposal<W::Key, V>,
{
    type Item = (W::Strong, &'a V);
    type IntoIter = Iter<'a, W, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over `(key, &value)` pairs, produced by [`WeakKeyMap::iter`].
pub struct Iter<'a, W: WeakKey, V> {
    weak: store::Iter<'a, u64, WeakEntry<W, V>>,
    hard: store::Iter<'a, W::Strong, V>,
}

impl<'a, W: WeakKey, V> Iterator for Iter<'a, W, V> {
    type Item = (W::Strong, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (_, entry) in self.weak.by_ref() {
            if let (Some(key), Some(value)) = (entry.key(), entry.value()) {
                return Some((key, value));
            }
        }
        self.hard.next().map(|(key, value)| (key.clone(), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, weak) = self.weak.size_hint();
        let (hard, hard_upper) = self.hard.size_hint();
        let upper = match (weak, hard_upper) {
            (Some(w), Some(h)) => w.checked_add(h),
            _ => None,
        };
        (hard, upper)
    }
}

pub struct Keys<'a, W: WeakKey, V>(Iter<'a, W, V>);

impl<'a, W: WeakKey, V> Iterator for Keys<'a, W, V> {
    type Item = W::Strong;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

pub struct Values<'a, W: WeakKey, V>(Iter<'a, W, V>);

impl<'a, W: WeakKey, V> Iterator for Values<'a, W, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispose::{Dispose, DisposeValues};
    use crate::store::tests::ConstBuildHasher;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};
    use test_log::test;

    type ConstMap<V> = WeakKeyMap<Weak<str>, V, ConstBuildHasher>;

    fn key(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    #[derive(Debug, PartialEq)]
    struct Tracked {
        id: u32,
        disposed: Rc<Cell<u32>>,
    }

    impl Dispose for Tracked {
        fn dispose(&self) {
            self.disposed.set(self.disposed.get() + 1);
        }
    }

    #[test]
    fn collision_goes_to_hard_store() {
        let mut m: ConstMap<i32> = WeakKeyMap::with_hasher(ConstBuildHasher);
        let (a, b) = (key("a"), key("b"));
        assert_eq!(m.add(&a, 1), Ok(Placement::Weak));
        assert_eq!(m.add(&b, 2), Ok(Placement::Hard));
        assert_eq!((m.weak.len(), m.hard.len()), (1, 1));
        assert_eq!(m.get("a"), Some(&1));
        assert_eq!(m.get("b"), Some(&2));
        assert!(m.is_partitioned());
    }

    #[test]
    fn readding_a_hard_key_after_its_weak_rival_is_swept_stays_hard() {
        let mut m: ConstMap<i32> = WeakKeyMap::with_hasher(ConstBuildHasher);
        let a = key("a");
        let b = key("b");
        m.add(&a, 1).unwrap();
        m.add(&b, 2).unwrap();
        drop(a);
        assert!(m.clean());
        assert_eq!(m.weak.len(), 0);

        // The weak slot is free now, yet `b` must not be stored twice.
        assert_eq!(m.add(&b, 2), Ok(Placement::Hard));
        assert_eq!(m.add(&b, 3), Err(WeakMapError::DuplicateKey));
        assert_eq!(m.len(), 1);
        assert!(m.is_partitioned());
    }

    #[test]
    fn dead_occupant_without_auto_clean_routes_to_hard() {
        let mut m: ConstMap<i32> = WeakKeyMap::with_hasher(ConstBuildHasher);
        m.set_auto_clean(false);
        let a = key("a");
        m.add(&a, 1).unwrap();
        drop(a);

        let revived = key("a");
        assert_eq!(m.add(&revived, 9), Ok(Placement::Hard));
        assert_eq!(m.len(), 2, "the dead entry still counts");
        assert_eq!(m.peek("a"), Some(&9));
        assert!(m.is_partitioned());

        assert!(m.clean());
        assert_eq!(m.len(), 1);
        assert_eq!(m.placement("a"), Some(Placement::Hard));
    }

    #[test]
    fn contains_key_counts_unswept_dead_slots() {
        let mut m: WeakKeyMap<Weak<str>, i32> = WeakKeyMap::new();
        m.set_auto_clean(false);
        let k = key("k");
        m.add(&k, 1).unwrap();
        drop(k);

        assert_eq!(m.len(), 1);
        assert!(m.contains_key("k"), "presence in the index, not liveness");
        assert_eq!(m.peek("k"), None);
        assert_eq!(m.placement("k"), None);

        assert!(m.clean());
        assert!(!m.contains_key("k"));
    }

    #[test]
    fn contains_key_ignores_a_live_colliding_occupant() {
        let mut m: ConstMap<i32> = WeakKeyMap::with_hasher(ConstBuildHasher);
        let a = key("a");
        m.add(&a, 1).unwrap();
        assert!(m.contains_key("a"));
        assert!(!m.contains_key("b"), "same slot, different live key");

        drop(a);
        assert!(m.contains_key("b"), "a dead occupant holds the slot");
    }

    #[test]
    fn get_sweeps_only_its_own_slot() {
        let mut m: WeakKeyMap<Weak<str>, i32> = WeakKeyMap::new();
        let (a, b) = (key("a"), key("b"));
        m.add(&a, 1).unwrap();
        m.add(&b, 2).unwrap();
        drop(a);
        drop(b);

        assert_eq!(m.get("a"), None);
        assert_eq!(m.len(), 1, "only the slot for `a` was swept");
        assert!(m.clean_key("b"));
        assert!(m.is_empty());
        assert!(!m.clean_key("b"));
    }

    #[test]
    fn sweeps_dispose_values_exactly_once() {
        let disposed = Rc::new(Cell::new(0));
        let mut m: WeakKeyMap<Weak<str>, Tracked, RandomState, DisposeValues> =
            WeakKeyMapBuilder::new().disposal(DisposeValues).build();
        let a = key("a");
        m.add(&a, Tracked { id: 1, disposed: disposed.clone() }).unwrap();
        drop(a);

        assert!(m.clean());
        assert!(!m.clean());
        assert_eq!(disposed.get(), 1);
        assert!(m.is_empty());
    }

    #[test]
    fn remove_and_clear_do_not_dispose() {
        let disposed = Rc::new(Cell::new(0));
        let mut m: WeakKeyMap<Weak<str>, Tracked, RandomState, DisposeValues> =
            WeakKeyMapBuilder::new().disposal(DisposeValues).build();
        let (a, b) = (key("a"), key("b"));
        m.add(&a, Tracked { id: 1, disposed: disposed.clone() }).unwrap();
        m.add(&b, Tracked { id: 2, disposed: disposed.clone() }).unwrap();

        let removed = m.remove("a").unwrap();
        assert_eq!(removed.id, 1);
        m.clear();
        assert!(m.is_empty());
        assert_eq!(disposed.get(), 0);
    }

    #[test]
    fn dispose_runs_every_cascade() {
        let disposed = Rc::new(Cell::new(0));
        let mut m: WeakKeyMap<Weak<str>, Tracked, ConstBuildHasher, DisposeValues> =
            WeakKeyMapBuilder::new()
                .hasher(ConstBuildHasher)
                .disposal(DisposeValues)
                .build();
        let (a, b) = (key("a"), key("b"));
        m.add(&a, Tracked { id: 1, disposed: disposed.clone() }).unwrap();
        m.add(&b, Tracked { id: 2, disposed: disposed.clone() }).unwrap();
        assert_eq!(m.hard.len(), 1);

        m.dispose();
        assert_eq!(disposed.get(), 2);
        assert!(m.is_empty());
    }

    #[test]
    fn set_never_creates_and_never_replaces_the_key() {
        let mut m: ConstMap<i32> = WeakKeyMap::with_hasher(ConstBuildHasher);
        let (a, b) = (key("a"), key("b"));
        assert_eq!(m.set("a", 1), Err(WeakMapError::UnknownKey));
        assert!(m.is_empty());

        m.add(&a, 1).unwrap();
        m.add(&b, 2).unwrap();
        m.set("a", 10).unwrap();
        m.set("b", 20).unwrap();
        assert_eq!(m.peek("a"), Some(&10));
        assert_eq!(m.peek("b"), Some(&20));
        assert_eq!(m.placement("a"), Some(Placement::Weak));
        assert_eq!(m.placement("b"), Some(Placement::Hard));
        assert_eq!(m.set("c", 3), Err(WeakMapError::UnknownKey));
    }

    #[test]
    fn get_mut_reaches_both_stores() {
        let mut m: ConstMap<Vec<u8>> = WeakKeyMap::with_hasher(ConstBuildHasher);
        let (a, b) = (key("a"), key("b"));
        m.add(&a, vec![1]).unwrap();
        m.add(&b, vec![2]).unwrap();
        m.get_mut("a").unwrap().push(10);
        m.get_mut("b").unwrap().push(20);
        assert_eq!(m.peek("a"), Some(&vec![1, 10]));
        assert_eq!(m.peek("b"), Some(&vec![2, 20]));
        assert!(m.get_mut("c").is_none());
    }

    #[test]
    fn debug_shows_store_sizes() {
        let mut m: ConstMap<i32> = WeakKeyMap::with_hasher(ConstBuildHasher);
        let (a, b) = (key("a"), key("b"));
        m.add(&a, 1).unwrap();
        m.add(&b, 2).unwrap();
        assert_eq!(
            format!("{m:?}"),
            "WeakKeyMap { weak: 1, hard: 1, auto_clean: true }"
        );
    }
}
