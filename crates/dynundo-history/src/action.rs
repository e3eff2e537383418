/// Action records and the messages managed children send to their coordinator.
use serde::{Deserialize, Serialize};

use crate::direction::Direction;

/// Opaque reference to a child registered with an `UndoSuperManager`.
///
/// Handles are registry indices assigned in registration order. They carry
/// no ownership; resolving one is a plain index into the coordinator's
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagerHandle(pub(crate) usize);

impl ManagerHandle {
    /// Position of the child in its coordinator's registry.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "manager#{}", self.0)
    }
}

/// One push or step performed by a manager.
///
/// Records are values: they are built once, stored on the coordinator's
/// merged timeline, and never edited afterwards (except for re-basing when
/// the owner evicts its oldest snapshots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Manager whose stack this record refers to.
    pub owner: ManagerHandle,
    pub old_cursor: isize,
    pub new_cursor: isize,
    pub old_size: usize,
    pub new_size: usize,
    /// Step direction, `Inactive` for pushes.
    pub direction: Direction,
    /// Position on the merged timeline, assigned by the coordinator.
    pub seq: u64,
}

impl ActionRecord {
    /// Builds a record for a push that grew the stack from `old_size` to `new_size`.
    pub fn pushed(
        owner: ManagerHandle,
        old_cursor: isize,
        new_cursor: isize,
        old_size: usize,
        new_size: usize,
    ) -> Self {
        Self {
            owner,
            old_cursor,
            new_cursor,
            old_size,
            new_size,
            direction: Direction::Inactive,
            seq: 0,
        }
    }

    /// Builds a record for a step; the stack size does not change.
    pub fn executed(
        owner: ManagerHandle,
        old_cursor: isize,
        new_cursor: isize,
        size: usize,
        direction: Direction,
    ) -> Self {
        Self {
            owner,
            old_cursor,
            new_cursor,
            old_size: size,
            new_size: size,
            direction,
            seq: 0,
        }
    }

    /// Whether this record is the owner's very first snapshot.
    pub fn is_bootstrap(&self) -> bool {
        self.old_size == 0
    }
}

impl std::fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} #{}] cursor:{}->{} size:{}->{} ({})",
            self.owner,
            self.seq,
            self.old_cursor,
            self.new_cursor,
            self.old_size,
            self.new_size,
            self.direction
        )
    }
}

/// Message emitted by a managed child and consumed by its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEvent {
    /// The child appended a snapshot.
    Pushed(ActionRecord),
    /// The child started, accelerated or reversed a step.
    Executed(ActionRecord),
    /// The child dropped its `count` oldest snapshots to stay within capacity.
    Evicted { owner: ManagerHandle, count: usize },
}

impl UndoEvent {
    /// The child that emitted this event.
    pub fn owner(&self) -> ManagerHandle {
        match self {
            UndoEvent::Pushed(record) | UndoEvent::Executed(record) => record.owner,
            UndoEvent::Evicted { owner, .. } => *owner,
        }
    }
}
