//! Local fallback persistence: one serialized Memory snapshot in sqlite.
//!
//! The store is a plain key-value table holding a single JSON blob under a
//! fixed key, mirroring the browser-local storage it replaces. It is the
//! write-through target when no authenticated session exists and is only
//! read back at load time.

use crate::logging;
use crate::store::Memory;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fixed key the Memory snapshot is stored under.
const MEMORY_KEY: &str = "memory";

pub struct LocalStore {
    conn: Mutex<Connection>,
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("Library/Application Support/Eidolon")
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the store at the default per-user location.
    pub fn open_default() -> Result<Self> {
        let dir = default_db_path();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            logging::log_error(None, &format!("Failed to create data dir: {}", e));
        }
        Self::open(&dir.join("eidolon.db"))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load the persisted snapshot. A missing snapshot yields the default
    /// empty Memory; a corrupt one is logged and reset to default rather
    /// than crashing.
    pub fn load_memory(&self) -> Memory {
        let conn = self.conn.lock().unwrap();
        let blob = match get_value(&conn, MEMORY_KEY) {
            Ok(value) => value,
            Err(e) => {
                logging::log_error(None, &format!("Failed to read local snapshot: {}", e));
                return Memory::default();
            }
        };

        match blob {
            Some(json) => match serde_json::from_str::<Memory>(&json) {
                Ok(memory) => memory,
                Err(e) => {
                    logging::log_error(None, &format!(
                        "Corrupt local snapshot, resetting to empty: {}", e
                    ));
                    Memory::default()
                }
            },
            None => Memory::default(),
        }
    }

    /// Write the full snapshot, replacing whatever is stored.
    pub fn save_memory(&self, memory: &Memory) -> Result<()> {
        let json = serde_json::to_string(memory).unwrap_or_else(|_| "{}".to_string());
        let conn = self.conn.lock().unwrap();
        set_value(&conn, MEMORY_KEY, &json)
    }

    /// Read-modify-write the snapshot under one connection lock. Concurrent
    /// writers from other processes still race; last writer wins.
    pub fn update_memory<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Memory),
    {
        let conn = self.conn.lock().unwrap();
        let mut memory = match get_value(&conn, MEMORY_KEY)? {
            Some(json) => serde_json::from_str::<Memory>(&json).unwrap_or_else(|e| {
                logging::log_error(None, &format!(
                    "Corrupt local snapshot during update, resetting: {}", e
                ));
                Memory::default()
            }),
            None => Memory::default(),
        };

        mutate(&mut memory);

        let json = serde_json::to_string(&memory).unwrap_or_else(|_| "{}".to_string());
        set_value(&conn, MEMORY_KEY, &json)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS memory_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM memory_store WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO memory_store (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SyncState, Task, TaskKind};
    use chrono::Utc;

    fn sample_task(content: &str) -> Task {
        Task {
            id: "t-1".to_string(),
            content: content.to_string(),
            kind: TaskKind::Note,
            completed: false,
            created_at: Utc::now().to_rfc3339(),
            sync: SyncState::Confirmed,
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut memory = Memory::default();
        memory.tasks.push(sample_task("buy milk"));
        memory.user_facts.insert("name".to_string(), "Sam".to_string());
        store.save_memory(&memory).unwrap();

        let loaded = store.load_memory();
        assert_eq!(loaded.tasks, memory.tasks);
        assert_eq!(loaded.user_facts, memory.user_facts);
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let store = LocalStore::open_in_memory().unwrap();
        let loaded = store.load_memory();
        assert!(loaded.tasks.is_empty());
        assert!(loaded.user_facts.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_resets_to_default() {
        let store = LocalStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            set_value(&conn, MEMORY_KEY, "{not json").unwrap();
        }
        let loaded = store.load_memory();
        assert!(loaded.tasks.is_empty());
    }

    #[test]
    fn test_update_splices_without_clobbering() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut memory = Memory::default();
        memory.tasks.push(sample_task("first"));
        store.save_memory(&memory).unwrap();

        store
            .update_memory(|mem| mem.tasks.insert(0, sample_task("second")))
            .unwrap();

        let loaded = store.load_memory();
        assert_eq!(loaded.tasks.len(), 2);
        assert_eq!(loaded.tasks[0].content, "second");
        assert_eq!(loaded.tasks[1].content, "first");
    }
}
