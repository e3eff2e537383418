/// Snapshot stack with a cursor, plus its load/save against a `StackStore`.
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::persistence::StackStore;

/// Ordered snapshots and the index of the committed one.
///
/// `cursor` is `-1` exactly when the stack is empty; otherwise it indexes a
/// valid entry. Entries after the cursor form the redo branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoStack<T> {
    entries: Vec<T>,
    cursor: isize,
    /// Set when the stack was restored from a store.
    #[serde(skip)]
    loaded: bool,
}

impl<T> Default for UndoStack<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            cursor: -1,
            loaded: false,
        }
    }
}

impl<T> UndoStack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn get(&self, index: isize) -> Option<&T> {
        usize::try_from(index).ok().and_then(|i| self.entries.get(i))
    }

    /// Whether this stack was restored from a store.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// The committed snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the cursor does not index an entry.
    pub fn current(&self) -> &T {
        match self.get(self.cursor) {
            Some(entry) => entry,
            None => panic!(
                "UndoStack cursor {} out of bounds for {} entries",
                self.cursor,
                self.entries.len()
            ),
        }
    }

    /// The committed snapshot, or `None` for an empty stack.
    pub fn target(&self) -> Option<&T> {
        self.get(self.cursor)
    }

    /// Moves the cursor.
    ///
    /// # Panics
    ///
    /// Panics if `cursor` is outside `[-1, len - 1]`, or is `-1` on a
    /// non-empty stack.
    pub fn set_cursor(&mut self, cursor: isize) {
        assert!(
            self.cursor_in_bounds(cursor),
            "cursor {cursor} out of bounds for {} entries",
            self.entries.len()
        );
        self.cursor = cursor;
    }

    /// Drops every entry after `cursor` (the redo branch).
    pub fn truncate_after(&mut self, cursor: isize) {
        let keep = usize::try_from(cursor + 1).unwrap_or(0);
        self.entries.truncate(keep);
        self.cursor = self.cursor.min(self.entries.len() as isize - 1);
    }

    /// Keeps the first `size` entries and clamps the cursor into range.
    pub fn resize(&mut self, size: usize) {
        self.entries.truncate(size);
        self.cursor = self.cursor.min(size as isize - 1);
    }

    /// Discards the redo branch, appends `entry` and makes it current.
    pub fn push(&mut self, entry: T) {
        self.truncate_after(self.cursor);
        self.entries.push(entry);
        self.cursor = self.entries.len() as isize - 1;
    }

    /// Inserts `entry` at `index` without moving the cursor.
    pub fn insert(&mut self, index: usize, entry: T) {
        self.entries.insert(index, entry);
        if self.cursor < 0 {
            self.cursor = 0;
        }
    }

    /// Removes the entry at `index`, keeping the cursor on the same snapshot
    /// where possible.
    pub fn remove(&mut self, index: usize) -> T {
        let entry = self.entries.remove(index);
        if index as isize <= self.cursor {
            self.cursor -= 1;
        }
        if self.cursor < 0 && !self.entries.is_empty() {
            self.cursor = 0;
        }
        entry
    }

    /// Removes the `count` oldest entries, shifting the cursor down.
    ///
    /// Returns how many entries were removed.
    pub fn evict_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
        self.cursor -= count as isize;
        if self.cursor < 0 && !self.entries.is_empty() {
            self.cursor = 0;
        }
        count
    }

    /// Mutable access for in-place edits that keep the length unchanged.
    pub(crate) fn entries_mut(&mut self) -> &mut [T] {
        &mut self.entries
    }

    fn cursor_in_bounds(&self, cursor: isize) -> bool {
        if self.entries.is_empty() {
            cursor == -1
        } else {
            cursor >= 0 && cursor < self.entries.len() as isize
        }
    }
}

impl<T: Serialize + DeserializeOwned> UndoStack<T> {
    /// Persists the stack under `key`. No-op for an empty key.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store write fails.
    pub fn save(&self, store: &dyn StackStore, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        let bytes = bincode::serialize(self).context("Failed to serialize undo stack")?;
        store
            .save_bytes(key, &bytes)
            .with_context(|| format!("Failed to save undo stack '{key}'"))
    }

    /// Restores the stack stored under `key`.
    ///
    /// Never fails: a missing, unreadable or inconsistent entry yields a
    /// fresh stack. Whatever is returned is written back immediately so the
    /// next load finds a valid entry. An empty key returns a fresh stack and
    /// touches nothing.
    pub fn load(store: &dyn StackStore, key: &str) -> Self {
        if key.is_empty() {
            return Self::new();
        }

        let stack = match Self::read(store, key) {
            Ok(Some(mut stack)) => {
                stack.loaded = true;
                stack
            }
            Ok(None) => {
                tracing::debug!("No undo stack stored under '{key}', starting fresh");
                Self::new()
            }
            Err(e) => {
                tracing::warn!("Failed to load undo stack '{key}': {e:#}");
                Self::new()
            }
        };

        if let Err(e) = stack.save(store, key) {
            tracing::warn!("Failed to persist undo stack '{key}' after load: {e:#}");
        }
        stack
    }

    fn read(store: &dyn StackStore, key: &str) -> Result<Option<Self>> {
        let Some(bytes) = store.load_bytes(key)? else {
            return Ok(None);
        };
        let stack: Self =
            bincode::deserialize(&bytes).context("Failed to deserialize undo stack")?;
        if !stack.cursor_in_bounds(stack.cursor) {
            anyhow::bail!(
                "stored cursor {} is invalid for {} entries",
                stack.cursor,
                stack.entries.len()
            );
        }
        Ok(Some(stack))
    }
}
