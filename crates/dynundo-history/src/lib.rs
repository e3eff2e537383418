/// Animated undo/redo history for interactive objects.
///
/// Provides an `UndoManager` that keeps a stack of snapshots per object and
/// animates every undo/redo step as a transition the host ticks once per
/// frame, plus an `UndoSuperManager` that merges several managers into one
/// global timeline. Stacks are persisted to an embedded key-value store
/// (redb) and survive across application sessions.
pub mod action;
pub mod config;
pub mod direction;
pub mod element;
pub mod manager;
pub mod persistence;
pub mod stack;
pub mod super_manager;
pub mod transition;

pub use action::{ActionRecord, ManagerHandle, UndoEvent};
pub use config::{CapacityPolicy, UndoConfig};
pub use direction::{step, Direction};
pub use element::UndoElement;
pub use manager::{ManagedUndo, UndoManager};
pub use persistence::{MemoryStore, RedbStore, StackStore};
pub use stack::UndoStack;
pub use super_manager::UndoSuperManager;
pub use transition::Transition;
