/// Coordinator that merges several managers into one global timeline.
///
/// Children report every push and step over a channel; the coordinator keeps
/// an `UndoStack<ActionRecord>` with one record per child snapshot, in the
/// order they were created. Undo/redo on the coordinator walks that merged
/// stack and forwards each step to the child that owns the record, while the
/// other children are locked out.
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};

use crate::action::{ActionRecord, ManagerHandle, UndoEvent};
use crate::direction::Direction;
use crate::manager::ManagedUndo;
use crate::persistence::StackStore;
use crate::stack::UndoStack;
use crate::transition::Transition;

/// Merges the histories of its registered children into a single stack.
pub struct UndoSuperManager {
    stack: UndoStack<ActionRecord>,
    transition: Transition,
    actions_enabled: bool,
    children: Vec<Box<dyn ManagedUndo>>,
    /// Last value broadcast to every child.
    children_actions_enabled: bool,
    /// Child driving the running transition.
    executing: Option<ManagerHandle>,
    events_tx: Sender<UndoEvent>,
    events_rx: Receiver<UndoEvent>,
    next_seq: u64,
    key: String,
    store: Option<Arc<dyn StackStore>>,
}

impl std::fmt::Debug for UndoSuperManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoSuperManager")
            .field("key", &self.key)
            .field("records", &self.stack.len())
            .field("cursor", &self.stack.cursor())
            .field("transition", &self.transition)
            .field("children", &self.children.len())
            .field("executing", &self.executing)
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl Default for UndoSuperManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoSuperManager {
    /// Creates an empty, in-memory coordinator.
    ///
    /// The coordinator has no tuning of its own: replay runs at the
    /// executing child's rates and capacity is enforced per child.
    pub fn new() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            stack: UndoStack::new(),
            transition: Transition::default(),
            actions_enabled: true,
            children: Vec::new(),
            children_actions_enabled: true,
            executing: None,
            events_tx,
            events_rx,
            next_seq: 0,
            key: String::new(),
            store: None,
        }
    }

    /// Restores the merged stack stored under `key`, or starts fresh.
    ///
    /// Always starts inactive. Children must be registered again in the
    /// same order, since records refer to them by registration index.
    pub fn load_or_new(key: impl Into<String>, store: Option<Arc<dyn StackStore>>) -> Self {
        let key = key.into();
        let mut coordinator = Self::new();

        if let Some(store) = &store {
            coordinator.stack = UndoStack::load(store.as_ref(), &key);
            coordinator.next_seq = coordinator
                .stack
                .entries()
                .iter()
                .map(|record| record.seq + 1)
                .max()
                .unwrap_or(0);
        }
        coordinator.key = key;
        coordinator.store = store;
        coordinator
    }

    /// Registers `manager` and returns its handle.
    ///
    /// A manager restored with history the merged stack doesn't know about
    /// has that history adopted, so every snapshot stays reachable.
    pub fn add_manager<M: ManagedUndo>(&mut self, mut manager: M) -> Result<ManagerHandle> {
        if manager.is_managed() {
            anyhow::bail!("Cannot register a manager that already has a coordinator");
        }

        let handle = ManagerHandle(self.children.len());
        manager.attach(handle, self.events_tx.clone());
        self.children.push(Box::new(manager));
        tracing::debug!("Registered {handle} with coordinator '{}'", self.key);

        self.adopt_history(handle);
        Ok(handle)
    }

    pub fn children_len(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, handle: ManagerHandle) -> Option<&dyn ManagedUndo> {
        self.children.get(handle.0).map(|child| child.as_ref())
    }

    /// Typed access to a registered manager.
    ///
    /// Returns `None` for an unknown handle or a different manager type.
    pub fn manager<M: ManagedUndo>(&self, handle: ManagerHandle) -> Option<&M> {
        self.children.get(handle.0)?.as_any().downcast_ref()
    }

    /// Mutable typed access. Events the manager emits are only applied on
    /// the next coordinator call; prefer [`UndoSuperManager::with_manager`].
    pub fn manager_mut<M: ManagedUndo>(&mut self, handle: ManagerHandle) -> Option<&mut M> {
        self.children.get_mut(handle.0)?.as_any_mut().downcast_mut()
    }

    /// Runs `f` against a registered manager, then applies the events it
    /// produced.
    pub fn with_manager<M: ManagedUndo, R>(
        &mut self,
        handle: ManagerHandle,
        f: impl FnOnce(&mut M) -> R,
    ) -> Option<R> {
        let manager = self.manager_mut::<M>(handle)?;
        let result = f(manager);
        self.process_events();
        Some(result)
    }

    /// The merged timeline.
    pub fn stack(&self) -> &UndoStack<ActionRecord> {
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

    pub fn rate(&self) -> f32 {
        self.transition.rate()
    }

    pub fn activation_counter(&self) -> u32 {
        self.transition.activation_counter()
    }

    pub fn executing_child(&self) -> Option<ManagerHandle> {
        self.executing
    }

    pub fn actions_enabled(&self) -> bool {
        self.actions_enabled
    }

    pub fn set_actions_enabled(&mut self, enabled: bool) {
        self.actions_enabled = enabled;
    }

    pub fn children_actions_enabled(&self) -> bool {
        self.children_actions_enabled
    }

    /// Enables or disables push/undo/redo on every child.
    pub fn set_children_actions_enabled(&mut self, enabled: bool) {
        self.children_actions_enabled = enabled;
        for child in &mut self.children {
            child.set_actions_enabled(enabled);
        }
    }

    /// Applies every pending child event, in arrival order.
    pub fn process_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            tracing::trace!("Applying event from {}", event.owner());
            match event {
                UndoEvent::Pushed(record) => self.on_pushed(record),
                UndoEvent::Executed(record) => self.on_executed(record),
                UndoEvent::Evicted { owner, count } => self.on_evicted(owner, count),
            }
        }
    }

    /// The coordinator has no snapshot of its own to capture.
    pub fn push(&mut self) -> bool {
        tracing::error!("Cannot push on a coordinator; push through one of its managers instead");
        false
    }

    pub fn can_execute(&self, direction: Direction) -> bool {
        self.transition.can_execute(
            self.actions_enabled,
            self.stack.cursor(),
            self.stack.len(),
            direction,
        )
    }

    /// Starts, accelerates or reverses a step on the merged timeline.
    ///
    /// When idle, walks from the cursor in `direction` until a record whose
    /// owner can execute is found, and hands the step to that owner. Fails
    /// without side effects when no owner can.
    ///
    /// # Panics
    ///
    /// Panics if `direction` is `Inactive`.
    pub fn execute(&mut self, direction: Direction) -> bool {
        assert!(
            direction.is_active(),
            "execute requires Undo or Redo, got {direction}"
        );

        self.process_events();
        if !self.can_execute(direction) {
            return false;
        }

        let saved_cursor = self.stack.cursor();
        let saved_executing = self.executing;

        if !self.transition.is_active() {
            let Some(index) = self.find_executable(direction) else {
                tracing::debug!(
                    "No manager can {direction} from merged cursor {}",
                    self.stack.cursor()
                );
                return false;
            };
            self.stack.set_cursor(index as isize);
            self.executing = Some(self.stack.entries()[index].owner);
        }

        let Some(executing) = self.executing else {
            panic!("Coordinator transition is {} with no executing manager", self.state());
        };

        self.lock_to(executing);
        if !self.child_mut(executing).execute(direction) {
            tracing::warn!("{executing} refused to {direction}");
            self.set_children_actions_enabled(true);
            self.stack.set_cursor(saved_cursor);
            self.executing = saved_executing;
            return false;
        }

        self.process_events();
        true
    }

    pub fn can_undo(&self) -> bool {
        self.can_execute(Direction::Undo)
    }

    pub fn can_redo(&self) -> bool {
        self.can_execute(Direction::Redo)
    }

    pub fn undo(&mut self) -> bool {
        self.execute(Direction::Undo)
    }

    pub fn redo(&mut self) -> bool {
        self.execute(Direction::Redo)
    }

    /// Advances the coordinator's own transition.
    ///
    /// On completion every child is unlocked again.
    pub fn update_progress(&mut self, delta_time: f32) -> bool {
        self.process_events();
        if !self.transition.advance(delta_time) {
            return false;
        }

        if !self.transition.is_active() {
            self.set_children_actions_enabled(true);
            self.executing = None;
        }
        true
    }

    /// Advances the coordinator, then every child, by one frame.
    pub fn tick(&mut self, delta_time: f32) -> bool {
        let progressed = self.update_progress(delta_time);
        for child in &mut self.children {
            child.update_progress(delta_time);
        }
        progressed
    }

    /// Persists the merged stack, then every child.
    pub fn save(&self) -> Result<()> {
        if let Some(store) = &self.store {
            self.stack
                .save(store.as_ref(), &self.key)
                .with_context(|| format!("Failed to save merged stack '{}'", self.key))?;
        }
        for (index, child) in self.children.iter().enumerate() {
            child
                .save()
                .with_context(|| format!("Failed to save {}", ManagerHandle(index)))?;
        }
        Ok(())
    }

    fn on_pushed(&mut self, mut record: ActionRecord) {
        record.seq = self.take_seq();

        tracing::trace!("Merged push {record}");
        if record.is_bootstrap() {
            // First snapshot of a child: splice it in without discarding
            // anyone's redo branch.
            let at = (self.stack.cursor() + 1) as usize;
            self.stack.insert(at, record);
            self.stack.set_cursor(at as isize);
        } else {
            self.reconcile_redo_branch(record.owner);
            self.stack.push(record);
        }
        self.persist();
    }

    /// Shrinks other children to match the merged redo branch that the
    /// pending push is about to discard.
    fn reconcile_redo_branch(&mut self, pusher: ManagerHandle) {
        let cursor = self.stack.cursor();
        let start = (cursor + 1) as usize;
        let discarded = self.stack.entries()[start..].to_vec();

        for record in discarded.iter().rev() {
            if record.is_bootstrap() || record.owner == pusher {
                continue;
            }
            if let Some(child) = self.children.get_mut(record.owner.0) {
                tracing::debug!(
                    "Resizing {} to {} after push by {pusher}",
                    record.owner,
                    record.old_size
                );
                child.resize(record.old_size);
            }
        }

        self.stack.truncate_after(cursor);

        // Bootstrap records carry a child's first snapshot, which no resize
        // ever removes.
        for record in discarded.into_iter().filter(ActionRecord::is_bootstrap) {
            self.stack.push(record);
        }
    }

    fn on_executed(&mut self, record: ActionRecord) {
        let Some(index) = self
            .stack
            .entries()
            .iter()
            .rposition(|r| r.new_cursor == record.new_cursor && r.owner == record.owner)
        else {
            panic!("No merged record matches executed step {record}");
        };

        let executing = *self.executing.get_or_insert(record.owner);
        let direction = record.direction;

        let mut cursor = self.stack.cursor();
        if cursor == index as isize && self.transition.activation_counter() == 0 {
            cursor = index as isize - direction.as_step();
        }

        // The child already stepped, so only the merged bounds gate the replay
        assert!(
            self.transition
                .can_execute(true, cursor, self.stack.len(), direction),
            "Merged stack cannot replay {record} from cursor {cursor}"
        );

        let (undo_rate, speedup) = {
            let child = self.child_mut(executing);
            (child.undo_rate(), child.undo_speedup())
        };
        let new_cursor = self.transition.execute(direction, cursor, undo_rate, speedup);
        self.stack.set_cursor(new_cursor);
        self.transition.count_activation();

        self.lock_to(executing);
    }

    fn on_evicted(&mut self, owner: ManagerHandle, count: usize) {
        let shift = count as isize;
        let mut index = 0;
        while index < self.stack.len() {
            let record = &mut self.stack.entries_mut()[index];
            let dropped = record.owner == owner && {
                record.old_cursor -= shift;
                record.new_cursor -= shift;
                record.old_size = record.old_size.saturating_sub(count);
                record.new_size = record.new_size.saturating_sub(count);
                record.new_cursor < 0
            };

            if dropped {
                self.stack.remove(index);
            } else {
                index += 1;
            }
        }

        tracing::debug!("Re-based records of {owner} after evicting {count}");
        self.persist();
    }

    /// Index of the first record, walking in `direction`, whose owner can
    /// execute.
    ///
    /// Undo reverts the record at the cursor; redo applies the one after it,
    /// so the walk starts there.
    fn find_executable(&self, direction: Direction) -> Option<usize> {
        let mut index = match direction {
            Direction::Redo => self.stack.cursor() + 1,
            _ => self.stack.cursor(),
        };
        while index >= 0 && (index as usize) < self.stack.len() {
            let owner = self.stack.entries()[index as usize].owner;
            let can = self
                .children
                .get(owner.0)
                .is_some_and(|child| child.can_execute(direction));
            if can {
                return Some(index as usize);
            }
            index += direction.as_step();
        }
        None
    }

    /// Leaves only `handle` able to act.
    fn lock_to(&mut self, handle: ManagerHandle) {
        self.set_children_actions_enabled(false);
        self.child_mut(handle).set_actions_enabled(true);
    }

    fn child_mut(&mut self, handle: ManagerHandle) -> &mut dyn ManagedUndo {
        match self.children.get_mut(handle.0) {
            Some(child) => child.as_mut(),
            None => panic!("{handle} is not registered with coordinator '{}'", self.key),
        }
    }

    /// Inserts one record per snapshot of a child registered with history
    /// unknown to the merged stack.
    fn adopt_history(&mut self, handle: ManagerHandle) {
        let (len, child_cursor) = match self.child(handle) {
            Some(child) => (child.len(), child.cursor()),
            None => return,
        };
        if len == 0 || self.stack.entries().iter().any(|r| r.owner == handle) {
            return;
        }

        let mut at = (self.stack.cursor() + 1) as usize;
        for snapshot in 0..len {
            let position = snapshot as isize;
            let mut record =
                ActionRecord::pushed(handle, position - 1, position, snapshot, snapshot + 1);
            record.seq = self.take_seq();
            self.stack.insert(at, record);
            if position <= child_cursor {
                self.stack.set_cursor(at as isize);
            }
            at += 1;
        }

        tracing::info!("Adopted {len} existing snapshots of {handle}");
        self.persist();
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = self.stack.save(store.as_ref(), &self.key) {
                tracing::warn!("Failed to persist merged stack '{}': {e:#}", self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapacityPolicy, UndoConfig};
    use crate::element::testing::{Dial, DialState};
    use crate::manager::UndoManager;
    use crate::persistence::MemoryStore;

    type DialManager = UndoManager<DialState>;

    fn push(coordinator: &mut UndoSuperManager, handle: ManagerHandle, value: i32) -> bool {
        coordinator
            .with_manager::<DialManager, _>(handle, |m| m.push(&Dial { value }))
            .expect("registered dial manager")
    }

    fn settle(coordinator: &mut UndoSuperManager) {
        while coordinator.tick(0.1) {}
    }

    fn dial(coordinator: &UndoSuperManager, handle: ManagerHandle) -> &DialManager {
        coordinator
            .manager::<DialManager>(handle)
            .expect("registered dial manager")
    }

    fn two_dials() -> (UndoSuperManager, ManagerHandle, ManagerHandle) {
        let mut coordinator = UndoSuperManager::new();
        let a = coordinator
            .add_manager(DialManager::in_memory())
            .expect("register a");
        let b = coordinator
            .add_manager(DialManager::in_memory())
            .expect("register b");
        (coordinator, a, b)
    }

    fn owners(coordinator: &UndoSuperManager) -> Vec<(usize, isize)> {
        coordinator
            .stack()
            .entries()
            .iter()
            .map(|r| (r.owner.index(), r.new_cursor))
            .collect()
    }

    #[test]
    fn test_registration_assigns_handles() {
        let (coordinator, a, b) = two_dials();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(coordinator.children_len(), 2);
        assert!(dial(&coordinator, a).is_managed());
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_add_manager_rejects_managed() {
        let mut first = UndoSuperManager::new();
        let mut manager = DialManager::in_memory();
        let (tx, _rx) = crossbeam_channel::unbounded();
        ManagedUndo::attach(&mut manager, ManagerHandle(0), tx);
        assert!(first.add_manager(manager).is_err());
        assert_eq!(first.children_len(), 0);
    }

    #[test]
    fn test_typed_access_checks_type_and_handle() {
        let (coordinator, a, _) = two_dials();
        assert!(coordinator.manager::<DialManager>(a).is_some());
        assert!(coordinator.manager::<DialManager>(ManagerHandle(9)).is_none());
    }

    #[test]
    fn test_push_on_coordinator_fails() {
        let (mut coordinator, _, _) = two_dials();
        assert!(!coordinator.push());
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_first_snapshots_are_spliced_after_cursor() {
        let (mut coordinator, a, b) = two_dials();
        assert!(push(&mut coordinator, a, 0));
        assert!(push(&mut coordinator, b, 100));

        assert_eq!(owners(&coordinator), vec![(0, 0), (1, 0)]);
        assert_eq!(coordinator.cursor(), 1);
        let seqs: Vec<u64> = coordinator.stack().entries().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_undo_forwards_to_last_owner_and_locks_others() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, b, 100);
        push(&mut coordinator, a, 1);
        assert_eq!(owners(&coordinator), vec![(0, 0), (1, 0), (0, 1)]);

        assert!(coordinator.undo());
        assert_eq!(coordinator.executing_child(), Some(a));
        assert_eq!(coordinator.state(), Direction::Undo);
        assert_eq!(coordinator.cursor(), 1);
        assert_eq!(dial(&coordinator, a).cursor(), 0);
        assert!(dial(&coordinator, a).actions_enabled());
        assert!(!dial(&coordinator, b).actions_enabled());

        settle(&mut coordinator);
        assert_eq!(coordinator.state(), Direction::Inactive);
        assert_eq!(coordinator.executing_child(), None);
        assert!(dial(&coordinator, a).actions_enabled());
        assert!(dial(&coordinator, b).actions_enabled());
    }

    #[test]
    fn test_undo_skips_owners_that_cannot_step() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);
        push(&mut coordinator, b, 100);
        assert_eq!(owners(&coordinator), vec![(0, 0), (0, 1), (1, 0)]);

        // B only has its first snapshot; the step goes to A.
        assert!(coordinator.undo());
        assert_eq!(coordinator.executing_child(), Some(a));
        assert_eq!(coordinator.cursor(), 0);
        assert_eq!(dial(&coordinator, a).cursor(), 0);
        assert_eq!(dial(&coordinator, b).cursor(), 0);
    }

    #[test]
    fn test_undo_fails_without_side_effects_when_nobody_can() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, b, 100);

        assert!(coordinator.can_undo());
        assert!(!coordinator.undo());
        assert_eq!(coordinator.cursor(), 1);
        assert_eq!(coordinator.state(), Direction::Inactive);
        assert_eq!(coordinator.executing_child(), None);
        assert!(dial(&coordinator, a).actions_enabled());
        assert!(dial(&coordinator, b).actions_enabled());
    }

    #[test]
    fn test_redo_reapplies_undone_record() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, b, 100);
        push(&mut coordinator, a, 1);

        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(coordinator.cursor(), 1);
        assert!(coordinator.can_redo());

        // B sits on the cursor but has nothing to redo; A's record is next.
        assert!(coordinator.redo());
        assert_eq!(coordinator.executing_child(), Some(a));
        assert_eq!(coordinator.cursor(), 2);
        assert_eq!(coordinator.state(), Direction::Redo);
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 1);
        assert_eq!(dial(&coordinator, b).cursor(), 0);
        assert!(!coordinator.can_redo());
    }

    #[test]
    fn test_redo_follows_merged_order() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, b, 100);
        push(&mut coordinator, a, 1);
        push(&mut coordinator, b, 101);

        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 0);
        assert_eq!(dial(&coordinator, b).cursor(), 0);
        assert_eq!(coordinator.cursor(), 1);

        // B could redo too, but A's record comes first.
        assert!(coordinator.redo());
        assert_eq!(coordinator.executing_child(), Some(a));
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 1);
        assert_eq!(coordinator.cursor(), 2);

        assert!(coordinator.redo());
        assert_eq!(coordinator.executing_child(), Some(b));
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, b).cursor(), 1);
        assert_eq!(coordinator.cursor(), 3);
        assert!(!coordinator.can_redo());
    }

    #[test]
    fn test_repeated_undo_accelerates_both() {
        let (mut coordinator, a, _) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);
        push(&mut coordinator, a, 2);

        assert!(coordinator.undo());
        assert!(coordinator.undo());
        assert_eq!(coordinator.cursor(), 1);
        assert_eq!(dial(&coordinator, a).cursor(), 1);
        assert_eq!(coordinator.rate(), 6.0);
        assert_eq!(dial(&coordinator, a).rate(), 6.0);
        assert_eq!(coordinator.activation_counter(), 2);
    }

    #[test]
    fn test_reversal_mirrors_child() {
        let (mut coordinator, a, _) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);

        assert!(coordinator.undo());
        coordinator.tick(0.1);
        assert!(coordinator.redo());

        assert_eq!(coordinator.state(), Direction::Redo);
        assert_eq!(coordinator.cursor(), 1);
        assert_eq!(dial(&coordinator, a).cursor(), 1);
        assert_eq!(coordinator.activation_counter(), 2);
        assert!((coordinator.progress() - dial(&coordinator, a).progress()).abs() < 1e-6);
    }

    #[test]
    fn test_replay_runs_at_each_childs_rate() {
        let mut coordinator = UndoSuperManager::new();
        let fast = coordinator
            .add_manager(DialManager::new(UndoConfig {
                undo_rate: 5.0,
                undo_speedup: 4.0,
                ..UndoConfig::default()
            }))
            .expect("register fast");
        let slow = coordinator
            .add_manager(DialManager::in_memory())
            .expect("register slow");
        push(&mut coordinator, fast, 0);
        push(&mut coordinator, slow, 100);
        push(&mut coordinator, fast, 1);
        push(&mut coordinator, slow, 101);

        assert!(coordinator.undo());
        assert_eq!(coordinator.executing_child(), Some(slow));
        assert_eq!(coordinator.rate(), 3.0);
        settle(&mut coordinator);

        assert!(coordinator.undo());
        assert_eq!(coordinator.executing_child(), Some(fast));
        assert_eq!(coordinator.rate(), 5.0);
        assert!(coordinator.undo());
        assert_eq!(coordinator.rate(), 20.0);
        assert_eq!(coordinator.rate(), dial(&coordinator, fast).rate());
    }

    #[test]
    fn test_push_after_undo_resizes_other_children() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, b, 100);
        push(&mut coordinator, b, 101);

        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(coordinator.cursor(), 1);

        assert!(push(&mut coordinator, a, 1));
        assert_eq!(dial(&coordinator, b).len(), 1);
        assert_eq!(dial(&coordinator, b).cursor(), 0);
        assert_eq!(owners(&coordinator), vec![(0, 0), (1, 0), (0, 1)]);
        assert_eq!(coordinator.cursor(), 2);
        assert!(!coordinator.can_redo());
    }

    #[test]
    fn test_push_keeps_first_snapshots_from_redo_branch() {
        let (mut coordinator, a, b) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);
        push(&mut coordinator, b, 100);

        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(coordinator.cursor(), 0);

        assert!(push(&mut coordinator, a, 5));
        assert_eq!(owners(&coordinator), vec![(0, 0), (1, 0), (0, 1)]);
        assert_eq!(dial(&coordinator, b).len(), 1);

        // B's first snapshot is still matched when A steps back over it.
        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 0);
    }

    #[test]
    fn test_eviction_rebases_records() {
        let mut coordinator = UndoSuperManager::new();
        let config = UndoConfig {
            capacity: Some(2),
            capacity_policy: CapacityPolicy::EvictOldest,
            ..UndoConfig::default()
        };
        let a = coordinator
            .add_manager(DialManager::new(config))
            .expect("register");
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);
        push(&mut coordinator, a, 2);

        assert_eq!(dial(&coordinator, a).len(), 2);
        assert_eq!(owners(&coordinator), vec![(0, 0), (0, 1)]);
        assert_eq!(coordinator.cursor(), 1);

        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 0);
        assert_eq!(coordinator.cursor(), 0);
    }

    #[test]
    fn test_direct_child_step_is_adopted() {
        let (mut coordinator, a, _) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);

        // A managed child refuses its own undo; step it through the trait.
        let stepped = coordinator
            .with_manager::<DialManager, _>(a, |m| ManagedUndo::execute(m, Direction::Undo))
            .expect("registered");
        assert!(stepped);
        assert_eq!(coordinator.executing_child(), Some(a));
        assert_eq!(coordinator.cursor(), 0);
    }

    #[test]
    #[should_panic(expected = "No merged record matches")]
    fn test_unknown_executed_record_is_fatal() {
        let (mut coordinator, a, _) = two_dials();
        push(&mut coordinator, a, 0);
        coordinator
            .events_tx
            .send(UndoEvent::Executed(ActionRecord::executed(
                a,
                5,
                4,
                6,
                Direction::Undo,
            )))
            .expect("send");
        coordinator.process_events();
    }

    #[test]
    #[should_panic(expected = "cannot replay")]
    fn test_executed_step_past_merged_end_is_fatal() {
        let (mut coordinator, a, _) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);
        assert_eq!(coordinator.cursor(), 1);

        // Matches A's first record, but a redo from the merged end has nowhere to go
        coordinator
            .events_tx
            .send(UndoEvent::Executed(ActionRecord::executed(
                a,
                -1,
                0,
                2,
                Direction::Redo,
            )))
            .expect("send");
        coordinator.process_events();
    }

    #[test]
    fn test_direct_child_step_replays_while_coordinator_disabled() {
        let (mut coordinator, a, _) = two_dials();
        push(&mut coordinator, a, 0);
        push(&mut coordinator, a, 1);
        coordinator.set_actions_enabled(false);
        assert!(!coordinator.undo());

        let stepped = coordinator
            .with_manager::<DialManager, _>(a, |m| ManagedUndo::execute(m, Direction::Undo))
            .expect("registered");
        assert!(stepped);
        assert_eq!(coordinator.cursor(), 0);
        assert_eq!(coordinator.state(), Direction::Undo);
        assert_eq!(coordinator.executing_child(), Some(a));
    }

    #[test]
    fn test_restored_history_is_adopted() {
        let mut manager = DialManager::in_memory();
        manager.push(&Dial { value: 0 });
        manager.push(&Dial { value: 1 });
        manager.push(&Dial { value: 2 });
        manager.undo();
        while manager.update_progress(0.1) {}

        let mut coordinator = UndoSuperManager::new();
        let a = coordinator.add_manager(manager).expect("register");
        assert_eq!(owners(&coordinator), vec![(0, 0), (0, 1), (0, 2)]);
        assert_eq!(coordinator.cursor(), 1);

        assert!(coordinator.redo());
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 2);
        assert_eq!(coordinator.cursor(), 2);
    }

    #[test]
    fn test_save_and_reload_merged_stack() {
        let store: Arc<dyn StackStore> = MemoryStore::new();
        let build = |store: &Arc<dyn StackStore>| {
            let mut coordinator = UndoSuperManager::load_or_new("merged", Some(store.clone()));
            let a = coordinator
                .add_manager(DialManager::load_or_new(
                    "a",
                    UndoConfig::default(),
                    Some(store.clone()),
                ))
                .expect("register a");
            let b = coordinator
                .add_manager(DialManager::load_or_new(
                    "b",
                    UndoConfig::default(),
                    Some(store.clone()),
                ))
                .expect("register b");
            (coordinator, a, b)
        };

        {
            let (mut coordinator, a, b) = build(&store);
            push(&mut coordinator, a, 0);
            push(&mut coordinator, b, 100);
            push(&mut coordinator, a, 1);
            coordinator.save().expect("save");
        }

        let (mut coordinator, a, _) = build(&store);
        assert_eq!(owners(&coordinator), vec![(0, 0), (1, 0), (0, 1)]);
        assert_eq!(coordinator.cursor(), 2);
        assert_eq!(coordinator.state(), Direction::Inactive);

        settle(&mut coordinator);
        assert!(coordinator.undo());
        settle(&mut coordinator);
        assert_eq!(dial(&coordinator, a).cursor(), 0);

        push(&mut coordinator, a, 7);
        let last = coordinator.stack().entries().last().expect("record");
        assert_eq!(last.seq, 3);
    }
}
