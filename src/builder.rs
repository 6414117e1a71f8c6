use crate::dispose::{Disposal, Retain};
use crate::weak_key_map::WeakKeyMap;
use crate::weak_ref::WeakKey;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;

/// Builder for configuring a [`WeakKeyMap`].
///
/// # Example
///
/// ```
/// use std::rc::{Rc, Weak};
/// use weak_key_map::{Dispose, DisposeValues, WeakKeyMap, WeakKeyMapBuilder};
///
/// struct Texture;
/// impl Dispose for Texture {
///     fn dispose(&self) {}
/// }
/// impl PartialEq for Texture {
///     fn eq(&self, _: &Self) -> bool { true }
/// }
///
/// let mut map: WeakKeyMap<Weak<str>, Texture, _, _> = WeakKeyMapBuilder::new()
///     .auto_clean(false)
///     .disposal(DisposeValues)
///     .build();
///
/// let key: Rc<str> = Rc::from("grass");
/// map.add(&key, Texture).unwrap();
/// assert!(map.contains_key("grass"));
/// ```
#[derive(Clone, Debug)]
pub struct WeakKeyMapBuilder<S = RandomState, D = Retain> {
    hasher: S,
    disposal: D,
    auto_clean: bool,
}

impl WeakKeyMapBuilder {
    /// Defaults: auto-clean on, `RandomState`, no disposal cascade.
    pub fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            disposal: Retain,
            auto_clean: true,
        }
    }
}

impl Default for WeakKeyMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> WeakKeyMapBuilder<S, D> {
    /// Sweep dead entries opportunistically before `add`, `get` and
    /// iteration.
    ///
    /// Default: `true`
    pub fn auto_clean(mut self, auto_clean: bool) -> Self {
        self.auto_clean = auto_clean;
        self
    }

    /// Hasher used both for identity hashes and for the hard store.
    pub fn hasher<S2>(self, hasher: S2) -> WeakKeyMapBuilder<S2, D> {
        WeakKeyMapBuilder {
            hasher,
            disposal: self.disposal,
            auto_clean: self.auto_clean,
        }
    }

    /// Policy applied when sweeps or `dispose` destroy an entry.
    ///
    /// Default: [`Retain`]
    pub fn disposal<D2>(self, disposal: D2) -> WeakKeyMapBuilder<S, D2> {
        WeakKeyMapBuilder {
            hasher: self.hasher,
            disposal,
            auto_clean: self.auto_clean,
        }
    }

    pub fn build<W, V>(self) -> WeakKeyMap<W, V, S, D>
    where
        W: WeakKey,
        S: BuildHasher + Clone,
        D: Disposal<W::Key, V>,
    {
        WeakKeyMap::from_parts(self.hasher, self.disposal, self.auto_clean)
    }
}
