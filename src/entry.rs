//! WeakEntry: a weakly-held key paired with a strongly-held value.

use crate::dispose::Disposal;
use crate::weak_ref::{key_of, WeakKey};
use core::fmt;

/// A key held through `W` next to an owned value.
///
/// The entry never keeps its key alive. Both halves are released by
/// [`WeakEntry::dispose`]; after that every accessor reports `None`.
pub struct WeakEntry<W, V> {
    key: Option<W>,
    value: Option<V>,
}

impl<W: WeakKey, V> WeakEntry<W, V> {
    /// Downgrade `key` and take ownership of `value`.
    pub fn new(key: &W::Strong, value: V) -> Self {
        Self {
            key: Some(W::downgrade(key)),
            value: Some(value),
        }
    }

    /// Resolve the key. `None` once every strong owner is gone.
    pub fn key(&self) -> Option<W::Strong> {
        self.key.as_ref().and_then(W::upgrade)
    }

    /// `None` only after [`dispose`](Self::dispose); the value outlives a
    /// dead key.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Mutable access to the value, `None` after disposal.
    pub fn value_mut(&mut self) -> Option<&mut V> {
        self.value.as_mut()
    }

    /// Replace the value, returning the previous one. The key is untouched.
    pub fn set_value(&mut self, value: V) -> Option<V> {
        self.value.replace(value)
    }

    /// Re-queries the weak reference on every call.
    pub fn is_alive(&self) -> bool {
        self.key.as_ref().map(W::is_alive).unwrap_or(false)
    }

    /// Whether [`dispose`](Self::dispose) has released both halves.
    pub fn is_disposed(&self) -> bool {
        self.key.is_none() && self.value.is_none()
    }

    /// Whether this entry's key resolves to one equal to `key`. A dead key
    /// matches nothing.
    pub fn matches(&self, key: &W::Key) -> bool {
        self.key()
            .map(|k| key_of::<W>(&k) == key)
            .unwrap_or(false)
    }

    /// Run the disposal cascade: the key if it is still alive and not
    /// already released, then the value. Both references are released;
    /// calling again is a no-op.
    pub fn dispose<D>(&mut self, disposal: &D)
    where
        D: Disposal<W::Key, V>,
    {
        if let Some(key) = self.key.take().and_then(|w| w.upgrade()) {
            let key = key_of::<W>(&key);
            if !disposal.is_released(key) {
                disposal.dispose_key(key);
            }
        }
        if let Some(value) = self.value.take() {
            disposal.dispose_value(&value);
        }
    }

    pub(crate) fn into_value(self) -> Option<V> {
        self.value
    }
}

impl<W: WeakKey, V: fmt::Debug> fmt::Debug for WeakEntry<W, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEntry")
            .field("alive", &self.is_alive())
            .field("value", &self.value)
            .finish()
    }
}
