//! The weak-reference capability keys are stored behind.

use core::borrow::Borrow;
use core::hash::Hash;
use std::rc::{self, Rc};
use std::sync::{self, Arc};

/// A non-owning handle to a shared key.
///
/// `Strong` is the owning pointer callers hold; the map keeps only `Self`.
/// `Strong`'s `Hash` and `Eq` must agree with `Key`'s, the same contract
/// `Borrow` already imposes.
pub trait WeakKey: Sized {
    /// What lookups compare against.
    type Key: ?Sized + Eq + Hash;

    /// The owning pointer.
    type Strong: Clone + Eq + Hash + Borrow<Self::Key>;

    /// Create a weak handle that does not keep `strong`'s referent alive.
    fn downgrade(strong: &Self::Strong) -> Self;

    /// Resolve the referent if some strong owner still exists.
    fn upgrade(&self) -> Option<Self::Strong>;

    /// Whether the referent is still reachable. Can flip to `false` between
    /// any two calls.
    fn is_alive(&self) -> bool;
}

impl<T> WeakKey for rc::Weak<T>
where
    T: ?Sized + Eq + Hash,
{
    type Key = T;
    type Strong = Rc<T>;

    #[inline]
    fn downgrade(strong: &Rc<T>) -> Self {
        Rc::downgrade(strong)
    }

    #[inline]
    fn upgrade(&self) -> Option<Rc<T>> {
        rc::Weak::upgrade(self)
    }

    #[inline]
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

impl<T> WeakKey for sync::Weak<T>
where
    T: ?Sized + Eq + Hash,
{
    type Key = T;
    type Strong = Arc<T>;

    #[inline]
    fn downgrade(strong: &Arc<T>) -> Self {
        Arc::downgrade(strong)
    }

    #[inline]
    fn upgrade(&self) -> Option<Arc<T>> {
        sync::Weak::upgrade(self)
    }

    #[inline]
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Borrow the comparable key out of a strong pointer.
#[inline]
pub(crate) fn key_of<W: WeakKey>(strong: &W::Strong) -> &W::Key {
    strong.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn rc_weak_tracks_last_owner() {
        let strong: Rc<str> = Rc::from("k");
        let extra = strong.clone();
        let weak = <rc::Weak<str> as WeakKey>::downgrade(&strong);
        assert!(weak.is_alive());
        assert_eq!(WeakKey::upgrade(&weak).as_deref(), Some("k"));

        drop(strong);
        assert!(weak.is_alive(), "a second owner keeps the key alive");
        drop(extra);
        assert!(!weak.is_alive());
        assert!(WeakKey::upgrade(&weak).is_none());
    }

    #[test]
    fn arc_weak_tracks_last_owner() {
        let strong = Arc::new(7u32);
        let weak = <sync::Weak<u32> as WeakKey>::downgrade(&strong);
        assert_eq!(WeakKey::upgrade(&weak).map(|a| *a), Some(7));
        drop(strong);
        assert!(!weak.is_alive());
    }

    #[test]
    fn upgraded_handle_borrows_key() {
        let strong: Rc<String> = Rc::new("abc".to_string());
        let key: &String = key_of::<rc::Weak<String>>(&strong);
        assert_eq!(key, "abc");
    }
}
