/// Snapshot capability implemented by payload types.
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A snapshot value that can be captured from its owning object.
///
/// Implementors are plain values: an `UndoManager` stores them on its stack,
/// persists them with bincode, and hands `(source, target, progress)` back to
/// the host while a transition animates. Applying a snapshot to the owner is
/// host code.
pub trait UndoElement: Clone + std::fmt::Debug + Serialize + DeserializeOwned + 'static {
    /// The object this snapshot is taken from.
    type Owner: ?Sized;

    /// Captures the current state of `owner`.
    fn capture(owner: &Self::Owner) -> Self;
}
