/// Key-value persistence for undo stacks.
///
/// Stacks are stored as opaque bincode blobs keyed by a caller-supplied
/// string. `RedbStore` keeps them in a single redb database file with one
/// table:
/// - `stacks`: stack key → bincode-serialized `UndoStack<T>`
///
/// `MemoryStore` keeps the same data in a map, for tests and for hosts that
/// do not want anything written to disk.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

/// Stack table: stack key → bincode-serialized stack.
const STACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("stacks");

/// File name of the redb database inside the data directory.
const DB_FILE_NAME: &str = "stacks.redb";

/// Storage backend for serialized undo stacks.
///
/// Shared between managers via `Arc<dyn StackStore>`.
pub trait StackStore {
    /// Stores `bytes` under `key`, replacing any previous value.
    fn save_bytes(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Loads the value stored under `key`, or `None` if nothing was saved.
    fn load_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Lists every stored key.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Persistence layer for undo stacks backed by redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish()
    }
}

impl RedbStore {
    /// Opens or creates the stack database in the given directory.
    ///
    /// Creates the directory and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join(DB_FILE_NAME);
        let db = Database::create(&db_path)
            .with_context(|| format!("Failed to open stack database: {}", db_path.display()))?;

        // Ensure the table exists
        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(STACKS_TABLE)
                .context("Failed to create stacks table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        Ok(Arc::new(Self { db }))
    }
}

impl StackStore for RedbStore {
    fn save_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(STACKS_TABLE)
                .context("Failed to open stacks table")?;
            table
                .insert(key, bytes)
                .with_context(|| format!("Failed to insert stack '{key}'"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    fn load_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(STACKS_TABLE)
            .context("Failed to open stacks table")?;

        match table
            .get(key)
            .with_context(|| format!("Failed to read stack '{key}'"))?
        {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(STACKS_TABLE)
            .context("Failed to open stacks table")?;

        let mut keys = Vec::new();
        for entry in table.iter().context("Failed to iterate stacks table")? {
            let (key_guard, _) = entry.context("Failed to read stack entry")?;
            keys.push(key_guard.value().to_string());
        }
        Ok(keys)
    }
}

/// In-memory stack store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store, ready to be shared.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl StackStore for MemoryStore {
    fn save_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}
