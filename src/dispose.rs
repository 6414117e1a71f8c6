//! Explicit teardown, separate from `Drop`.
//!
//! `Dispose` is the capability a key or value opts into. `Disposal` is the
//! policy a map is built with; it decides at compile time whether the map
//! calls into `Dispose` at all, so maps over plain types need no impls.
//!
//! Only sweeps (`clean`, `clean_key`, auto-clean) and `WeakKeyMap::dispose`
//! run the cascade. `remove` and `clear` never do.

use std::rc::Rc;
use std::sync::Arc;

/// Explicit release of held resources.
///
/// Implementations should be idempotent; the map itself never disposes the
/// same value twice.
pub trait Dispose {
    fn dispose(&self);

    /// Whether this object has already been torn down. A key reporting
    /// `true` is treated as dead under [`DisposeAll`].
    fn is_disposed(&self) -> bool {
        false
    }
}

impl<T: ?Sized + Dispose> Dispose for Rc<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

impl<T: ?Sized + Dispose> Dispose for Arc<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

impl<T: ?Sized + Dispose> Dispose for Box<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

impl<T: Dispose> Dispose for Option<T> {
    fn dispose(&self) {
        if let Some(inner) = self {
            inner.dispose();
        }
    }
    fn is_disposed(&self) -> bool {
        self.as_ref().map(Dispose::is_disposed).unwrap_or(false)
    }
}

/// Disposal policy for keys of type `K` and values of type `V`.
pub trait Disposal<K: ?Sized, V> {
    fn dispose_key(&self, key: &K);
    fn dispose_value(&self, value: &V);

    /// Whether `key` counts as gone even though it is still reachable.
    fn is_released(&self, key: &K) -> bool;
}

/// No cascade. Entries are dropped like any Rust value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Retain;

impl<K: ?Sized, V> Disposal<K, V> for Retain {
    #[inline]
    fn dispose_key(&self, _key: &K) {}
    #[inline]
    fn dispose_value(&self, _value: &V) {}
    #[inline]
    fn is_released(&self, _key: &K) -> bool {
        false
    }
}

/// Dispose values on sweep; keys are left alone.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DisposeValues;

impl<K: ?Sized, V: Dispose> Disposal<K, V> for DisposeValues {
    #[inline]
    fn dispose_key(&self, _key: &K) {}
    #[inline]
    fn dispose_value(&self, value: &V) {
        value.dispose()
    }
    #[inline]
    fn is_released(&self, _key: &K) -> bool {
        false
    }
}

/// Dispose keys and values on sweep, and treat disposed keys as dead.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DisposeAll;

impl<K: ?Sized + Dispose, V: Dispose> Disposal<K, V> for DisposeAll {
    #[inline]
    fn dispose_key(&self, key: &K) {
        key.dispose()
    }
    #[inline]
    fn dispose_value(&self, value: &V) {
        value.dispose()
    }
    #[inline]
    fn is_released(&self, key: &K) -> bool {
        key.is_disposed()
    }
}
