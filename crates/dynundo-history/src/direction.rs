/// Signed step direction shared by cursors and the transition state machine.
use serde::{Deserialize, Serialize};

/// Direction of an undo/redo step.
///
/// Doubles as the state of a manager: `Inactive` means no transition is
/// running, `Undo`/`Redo` mean a transition in that direction is animating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Undo,
    #[default]
    Inactive,
    Redo,
}

impl Direction {
    /// Cursor offset of this direction: -1, 0 or +1.
    pub fn as_step(self) -> isize {
        match self {
            Direction::Undo => -1,
            Direction::Inactive => 0,
            Direction::Redo => 1,
        }
    }

    /// The reverse direction. `Inactive` maps to itself.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Undo => Direction::Redo,
            Direction::Inactive => Direction::Inactive,
            Direction::Redo => Direction::Undo,
        }
    }

    /// Whether this is an actual step (`Undo` or `Redo`).
    pub fn is_active(self) -> bool {
        self != Direction::Inactive
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::Undo => "undo",
            Direction::Inactive => "inactive",
            Direction::Redo => "redo",
        };
        f.write_str(name)
    }
}

/// Moves `cursor` one step in `direction` within a stack of `len` entries.
///
/// Returns `None` when the result would fall outside `[0, len - 1]`.
pub fn step(cursor: isize, direction: Direction, len: usize) -> Option<isize> {
    let next = cursor + direction.as_step();
    if next < 0 || next >= len as isize {
        None
    } else {
        Some(next)
    }
}
