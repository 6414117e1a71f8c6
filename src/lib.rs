//! weak-key-map: a single-threaded map that does not keep its keys alive,
//! with a strong fallback store for identity-hash collisions.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: bind values to shared (`Rc`/`Arc`) keys without becoming a
//!   reason for those keys to stay allocated.
//! - Layers:
//!   - Store<K, V, S>: structural map over a `SlotMap` arena with a
//!     hashbrown `HashTable` index. Both halves of the map are Stores.
//!   - WeakEntry<W, V>: one weakly-held key next to its owned value; knows
//!     its own liveness and how to run its disposal cascade.
//!   - WeakKeyMap<W, V, S, D>: public API. A weak store keyed by identity
//!     hash, a hard store keyed by full equality, and the routing between
//!     them.
//!
//! Stores and partition
//! - The weak store holds at most one entry per identity hash. A second,
//!   different key with the same hash is placed in the hard store and is
//!   held strongly until removed.
//! - A key lives in exactly one store. `add` consults the hard store
//!   before the weak one so a key never lands in both after its weak rival
//!   has been swept.
//! - Weak-slot hits require the occupant to resolve to an equal key; a
//!   dead occupant matches nothing. `contains_key` is the exception: it
//!   tests presence in the index, so an unswept dead slot still counts.
//!
//! Liveness and cleanup
//! - A key dies when its last strong owner drops it. Nothing is notified;
//!   every liveness-dependent branch re-resolves the weak pointer at the
//!   point of use.
//! - Dead entries are removed lazily: before `add`/`get` on the touched
//!   slot and before iteration while auto-clean is on, or on demand via
//!   `clean`/`clean_key`. Until then they still count in `len`.
//!
//! Disposal
//! - `Dispose` is an explicit teardown hook, separate from `Drop`. The
//!   `Disposal` policy type parameter decides at compile time whether the
//!   map calls it, so maps over plain types need no impls.
//! - Only sweeps and `WeakKeyMap::dispose` run the cascade. `remove` hands
//!   the value back; `clear` drops it.
//!
//! Failure reporting
//! - Nothing panics. Duplicate and unknown keys come back as
//!   `WeakMapError` and are logged through `tracing`; a collision fallback
//!   is `Ok(Placement::Hard)` plus a debug event.
//!
//! Notes and non-goals
//! - Single-threaded: no internal locking. `Arc` keys are supported for
//!   their weak pointers, not for sharing the map across threads.
//! - No finalization callbacks; `Rc` offers none.

mod builder;
mod dispose;
mod entry;
mod error;
mod store;
mod weak_key_map;
mod weak_key_map_proptest;
mod weak_ref;

// Public surface
pub use builder::WeakKeyMapBuilder;
pub use dispose::{Dispose, Disposal, DisposeAll, DisposeValues, Retain};
pub use entry::WeakEntry;
pub use error::{Result, WeakMapError};
pub use weak_key_map::{Iter, Keys, Placement, Values, WeakKeyMap};
pub use weak_ref::WeakKey;
