/// Animated transition state shared by `UndoManager` and `UndoSuperManager`.
use crate::direction::{step, Direction};

/// State of the (at most one) in-flight transition of a manager.
///
/// The manager owns the stack and cursor; a `Transition` only decides how the
/// cursor moves and how progress advances, so both the per-object manager and
/// the coordinator drive the same algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    state: Direction,
    progress: f32,
    rate: f32,
    /// Execute calls received during the current transition.
    activation_counter: u32,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            state: Direction::Inactive,
            progress: 1.0,
            rate: 0.0,
            activation_counter: 0,
        }
    }
}

impl Transition {
    /// A transition that has just finished a redo: animating state with
    /// full progress, so the next tick settles it.
    pub fn completed_redo() -> Self {
        Self {
            state: Direction::Redo,
            progress: 1.0,
            ..Self::default()
        }
    }

    pub fn state(&self) -> Direction {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn activation_counter(&self) -> u32 {
        self.activation_counter
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether `direction` may be executed against a stack of `len` entries
    /// whose cursor is `cursor`.
    ///
    /// An active transition may always be accelerated or reversed.
    pub fn can_execute(
        &self,
        enabled: bool,
        cursor: isize,
        len: usize,
        direction: Direction,
    ) -> bool {
        if !enabled {
            return false;
        }
        if self.state == Direction::Inactive {
            return step(cursor, direction, len).is_some();
        }
        true
    }

    /// Applies one execute request and returns the new cursor.
    ///
    /// - Inactive: step the cursor, restart progress at 0 with `undo_rate`.
    /// - Same direction: multiply the rate by `speedup`; cursor unchanged.
    /// - Opposite direction: reverse in place. Progress becomes `1 - progress`
    ///   and the cursor steps back onto the snapshot the transition started
    ///   from.
    ///
    /// The activation counter is not touched; callers bump it with
    /// [`Transition::count_activation`] after emitting their event.
    ///
    /// # Panics
    ///
    /// Panics if `direction` is `Inactive`.
    pub fn execute(
        &mut self,
        direction: Direction,
        cursor: isize,
        undo_rate: f32,
        speedup: f32,
    ) -> isize {
        assert!(
            direction.is_active(),
            "execute requires Undo or Redo, got {direction}"
        );

        if self.state == Direction::Inactive {
            self.progress = 0.0;
            self.change_state(direction, undo_rate);
            cursor + direction.as_step()
        } else if direction == self.state.opposite() {
            self.progress = 1.0 - self.progress;
            self.change_state(direction, undo_rate);
            cursor + direction.as_step()
        } else {
            self.rate *= speedup;
            cursor
        }
    }

    /// Records one more execute call for the current transition.
    pub fn count_activation(&mut self) {
        self.activation_counter += 1;
    }

    /// Advances progress by `delta_time * rate`.
    ///
    /// Returns `false` without doing anything when inactive. Reaching full
    /// progress settles the transition back to `Inactive`.
    pub fn advance(&mut self, delta_time: f32) -> bool {
        if self.state == Direction::Inactive {
            return false;
        }

        self.progress += delta_time * self.rate;
        if self.progress >= 1.0 {
            self.state = Direction::Inactive;
            self.progress = 1.0;
            self.activation_counter = 0;
        }
        true
    }

    fn change_state(&mut self, direction: Direction, undo_rate: f32) {
        self.rate = undo_rate;
        self.state = direction;
    }
}
