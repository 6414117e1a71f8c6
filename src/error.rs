//! Errors reported by `WeakKeyMap`.

pub type Result<T, E = WeakMapError> = std::result::Result<T, E>;

/// Non-fatal failures reported by [`WeakKeyMap`](crate::WeakKeyMap).
///
/// The map is left unchanged whenever one of these is returned.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum WeakMapError {
    /// The key is already strongly held with a different value.
    #[error("key is already registered")]
    DuplicateKey,

    /// No binding exists for the key.
    #[error("key is not registered")]
    UnknownKey,
}
