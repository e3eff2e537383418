/// Per-object undo/redo manager with animated transitions.
///
/// An `UndoManager<T>` owns one `UndoStack<T>` and drives it through the
/// `Transition` state machine. Each step is animated: the host ticks
/// `update_progress` once per frame and interpolates between `source()` and
/// `target()` using `progress()`.
use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::Sender;

use crate::action::{ActionRecord, ManagerHandle, UndoEvent};
use crate::config::{CapacityPolicy, UndoConfig};
use crate::direction::Direction;
use crate::element::UndoElement;
use crate::persistence::StackStore;
use crate::stack::UndoStack;
use crate::transition::Transition;

/// Object-safe view of a manager, used by `UndoSuperManager` to drive
/// children of different snapshot types.
pub trait ManagedUndo: Any {
    fn state(&self) -> Direction;
    fn progress(&self) -> f32;
    fn activation_counter(&self) -> u32;
    /// Rate a fresh transition starts with.
    fn undo_rate(&self) -> f32;
    /// Rate multiplier for repeated same-direction executes.
    fn undo_speedup(&self) -> f32;

    fn actions_enabled(&self) -> bool;
    fn set_actions_enabled(&mut self, enabled: bool);

    /// Whether a coordinator drives this manager.
    fn is_managed(&self) -> bool;
    /// Hands the manager its registry handle and the coordinator's event
    /// channel. Marks it managed.
    fn attach(&mut self, handle: ManagerHandle, events: Sender<UndoEvent>);

    fn len(&self) -> usize;
    fn cursor(&self) -> isize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn can_execute(&self, direction: Direction) -> bool;
    fn execute(&mut self, direction: Direction) -> bool;
    fn update_progress(&mut self, delta_time: f32) -> bool;
    fn resize(&mut self, size: usize);
    fn save(&self) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Connection from a managed child to its coordinator.
#[derive(Debug, Clone)]
struct ManagerLink {
    handle: ManagerHandle,
    events: Sender<UndoEvent>,
}

/// Manages the undo/redo history of a single object.
pub struct UndoManager<T: UndoElement> {
    stack: UndoStack<T>,
    transition: Transition,
    config: UndoConfig,
    /// Gate for push/undo/redo; a coordinator toggles it for exclusivity.
    actions_enabled: bool,
    /// Set once registered with a coordinator.
    link: Option<ManagerLink>,
    /// Persistence key; empty = never persisted.
    key: String,
    store: Option<Arc<dyn StackStore>>,
}

impl<T: UndoElement> std::fmt::Debug for UndoManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoManager")
            .field("key", &self.key)
            .field("len", &self.stack.len())
            .field("cursor", &self.stack.cursor())
            .field("transition", &self.transition)
            .field("actions_enabled", &self.actions_enabled)
            .field("managed", &self.link.is_some())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl<T: UndoElement> UndoManager<T> {
    /// Creates an empty, in-memory manager.
    pub fn new(mut config: UndoConfig) -> Self {
        config.sanitize();
        Self {
            stack: UndoStack::new(),
            transition: Transition::default(),
            config,
            actions_enabled: true,
            link: None,
            key: String::new(),
            store: None,
        }
    }

    /// Creates an in-memory manager with default config.
    pub fn in_memory() -> Self {
        Self::new(UndoConfig::default())
    }

    /// Restores the stack stored under `key`, or starts fresh.
    ///
    /// Load failures are recovered inside `UndoStack::load`. A restored stack
    /// whose cursor is past the first snapshot starts in a just-completed
    /// redo, so the host applies the restored target on the first tick
    /// without animating.
    pub fn load_or_new(
        key: impl Into<String>,
        config: UndoConfig,
        store: Option<Arc<dyn StackStore>>,
    ) -> Self {
        let key = key.into();
        let mut manager = Self::new(config);

        if let Some(store) = &store {
            manager.stack = UndoStack::load(store.as_ref(), &key);
            if manager.stack.loaded() && manager.stack.cursor() > 0 {
                manager.transition = Transition::completed_redo();
            }
        }
        manager.key = key;
        manager.store = store;
        manager
    }

    pub fn stack(&self) -> &UndoStack<T> {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn cursor(&self) -> isize {
        self.stack.cursor()
    }

    pub fn state(&self) -> Direction {
        self.transition.state()
    }

    pub fn progress(&self) -> f32 {
        self.transition.progress()
    }

    /// Current transition rate, including any speedup.
    pub fn rate(&self) -> f32 {
        self.transition.rate()
    }

    pub fn activation_counter(&self) -> u32 {
        self.transition.activation_counter()
    }

    pub fn actions_enabled(&self) -> bool {
        self.actions_enabled
    }

    pub fn set_actions_enabled(&mut self, enabled: bool) {
        self.actions_enabled = enabled;
    }

    pub fn is_managed(&self) -> bool {
        self.link.is_some()
    }

    /// Pushes an initial snapshot of `owner` when configured to and the
    /// stack is still empty.
    pub fn start(&mut self, owner: &T::Owner) -> bool {
        if self.config.initialize_stack && self.stack.is_empty() {
            self.push(owner)
        } else {
            false
        }
    }

    /// Captures `owner` and pushes the snapshot.
    ///
    /// Fails when actions are disabled, a transition is running, or the
    /// stack is full under `CapacityPolicy::Reject`.
    pub fn push(&mut self, owner: &T::Owner) -> bool {
        if !self.can_push() {
            return false;
        }
        self.push_element(T::capture(owner))
    }

    /// Pushes an already captured snapshot.
    ///
    /// Drops the redo branch, appends, persists, and notifies the
    /// coordinator when managed.
    pub fn push_element(&mut self, element: T) -> bool {
        if !self.can_push() {
            return false;
        }

        let old_cursor = self.stack.cursor();
        // Size once the redo branch is gone
        let kept = (old_cursor + 1) as usize;

        if let Some(capacity) = self.config.capacity {
            if kept >= capacity && self.config.capacity_policy == CapacityPolicy::Reject {
                tracing::debug!(
                    "Rejecting push on '{}': capacity {capacity} reached",
                    self.key
                );
                return false;
            }
        }

        self.stack.push(element);

        let mut evicted = 0;
        if let Some(capacity) = self.config.capacity {
            if self.stack.len() > capacity {
                evicted = self.stack.evict_oldest(self.stack.len() - capacity);
                self.emit(|owner| UndoEvent::Evicted {
                    owner,
                    count: evicted,
                });
            }
        }

        self.persist();

        let new_cursor = self.stack.cursor();
        let new_size = self.stack.len();
        tracing::debug!(
            "Pushed snapshot on '{}': cursor {old_cursor}->{new_cursor}, size {kept}->{new_size}",
            self.key
        );
        self.emit(|owner| {
            UndoEvent::Pushed(ActionRecord::pushed(
                owner,
                old_cursor - evicted as isize,
                new_cursor,
                kept.saturating_sub(evicted),
                new_size,
            ))
        });
        true
    }

    /// Whether a step in `direction` would be accepted right now.
    pub fn can_execute(&self, direction: Direction) -> bool {
        self.transition.can_execute(
            self.actions_enabled,
            self.stack.cursor(),
            self.stack.len(),
            direction,
        )
    }

    /// Starts, accelerates or reverses a transition in `direction`.
    ///
    /// # Panics
    ///
    /// Panics if `direction` is `Inactive`.
    pub fn execute(&mut self, direction: Direction) -> bool {
        assert!(
            direction.is_active(),
            "execute requires Undo or Redo, got {direction}"
        );
        if !self.can_execute(direction) {
            return false;
        }

        let old_cursor = self.stack.cursor();
        let new_cursor = self.transition.execute(
            direction,
            old_cursor,
            self.config.undo_rate,
            self.config.undo_speedup,
        );
        self.stack.set_cursor(new_cursor);

        let size = self.stack.len();
        let state = self.transition.state();
        tracing::debug!(
            "Executed {direction} on '{}': cursor {old_cursor}->{new_cursor}, rate {}",
            self.key,
            self.transition.rate()
        );
        self.emit(|owner| {
            UndoEvent::Executed(ActionRecord::executed(
                owner, old_cursor, new_cursor, size, state,
            ))
        });
        self.transition.count_activation();
        true
    }

    /// Undo for standalone use; managed managers are driven by their coordinator.
    pub fn undo(&mut self) -> bool {
        !self.is_managed() && self.execute(Direction::Undo)
    }

    /// Redo for standalone use; managed managers are driven by their coordinator.
    pub fn redo(&mut self) -> bool {
        !self.is_managed() && self.execute(Direction::Redo)
    }

    pub fn can_undo(&self) -> bool {
        !self.is_managed() && self.can_execute(Direction::Undo)
    }

    pub fn can_redo(&self) -> bool {
        !self.is_managed() && self.can_execute(Direction::Redo)
    }

    /// Advances the running transition by `delta_time` seconds.
    ///
    /// Returns `false` when no transition is running.
    pub fn update_progress(&mut self, delta_time: f32) -> bool {
        self.transition.advance(delta_time)
    }

    /// Snapshot the current transition moves towards.
    pub fn target(&self) -> Option<&T> {
        self.stack.target()
    }

    /// Snapshot the current transition moves away from; equals `target()`
    /// when inactive.
    pub fn source(&self) -> Option<&T> {
        let target = self.stack.target()?;
        let state = self.transition.state();
        if !state.is_active() {
            return Some(target);
        }
        Some(
            self.stack
                .get(self.stack.cursor() - state.as_step())
                .unwrap_or(target),
        )
    }

    /// `(source, target, progress)` for the host to interpolate.
    pub fn frame(&self) -> Option<(&T, &T, f32)> {
        Some((self.source()?, self.target()?, self.transition.progress()))
    }

    /// Truncates the stack to `size` snapshots.
    ///
    /// Only a coordinator invalidating this manager's redo branch calls this.
    pub fn resize(&mut self, size: usize) {
        self.stack.resize(size);
        self.persist();
    }

    /// Persists the stack. No-op without a store or key.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store write fails.
    pub fn save(&self) -> Result<()> {
        match &self.store {
            Some(store) => self.stack.save(store.as_ref(), &self.key),
            None => Ok(()),
        }
    }

    fn can_push(&self) -> bool {
        self.actions_enabled && !self.transition.is_active()
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::warn!("Failed to persist undo stack '{}': {e:#}", self.key);
        }
    }

    fn emit(&self, event: impl FnOnce(ManagerHandle) -> UndoEvent) {
        let Some(link) = &self.link else {
            return;
        };
        if link.events.send(event(link.handle)).is_err() {
            tracing::warn!("Coordinator of '{}' is gone, event dropped", self.key);
        }
    }
}

impl<T: UndoElement> ManagedUndo for UndoManager<T> {
    fn state(&self) -> Direction {
        UndoManager::state(self)
    }

    fn progress(&self) -> f32 {
        UndoManager::progress(self)
    }

    fn activation_counter(&self) -> u32 {
        UndoManager::activation_counter(self)
    }

    fn undo_rate(&self) -> f32 {
        self.config.undo_rate
    }

    fn undo_speedup(&self) -> f32 {
        self.config.undo_speedup
    }

    fn actions_enabled(&self) -> bool {
        self.actions_enabled
    }

    fn set_actions_enabled(&mut self, enabled: bool) {
        self.actions_enabled = enabled;
    }

    fn is_managed(&self) -> bool {
        UndoManager::is_managed(self)
    }

    fn attach(&mut self, handle: ManagerHandle, events: Sender<UndoEvent>) {
        self.link = Some(ManagerLink { handle, events });
    }

    fn len(&self) -> usize {
        self.stack.len()
    }

    fn cursor(&self) -> isize {
        self.stack.cursor()
    }

    fn can_execute(&self, direction: Direction) -> bool {
        UndoManager::can_execute(self, direction)
    }

    fn execute(&mut self, direction: Direction) -> bool {
        UndoManager::execute(self, direction)
    }

    fn update_progress(&mut self, delta_time: f32) -> bool {
        UndoManager::update_progress(self, delta_time)
    }

    fn resize(&mut self, size: usize) {
        UndoManager::resize(self, size)
    }

    fn save(&self) -> Result<()> {
        UndoManager::save(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
