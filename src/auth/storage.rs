// Durable key-value storage for the session

use anyhow::Context;
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::types::{Session, ACCESS_TOKEN_KEY, EMAIL_KEY, NAME_KEY, REFRESH_TOKEN_KEY};
use crate::error::Result;

/// String-only key-value store that survives restarts.
///
/// A missing key means the field is absent.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Apply several writes; `None` removes the key.
    /// Backends that support it apply the batch atomically.
    fn write_all(&self, entries: &[(&str, Option<&str>)]) -> Result<()> {
        for (key, value) in entries {
            match value {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }
}

/// Read the persisted session (all-absent when nothing is stored)
pub fn load_session(store: &dyn SessionStore) -> Result<Session> {
    Ok(Session {
        access_token: store.get(ACCESS_TOKEN_KEY)?,
        refresh_token: store.get(REFRESH_TOKEN_KEY)?,
        email: store.get(EMAIL_KEY)?,
        name: store.get(NAME_KEY)?,
    })
}

/// Mirror a session into storage, removing absent fields
pub fn save_session(store: &dyn SessionStore, session: &Session) -> Result<()> {
    store.write_all(&[
        (ACCESS_TOKEN_KEY, session.access_token.as_deref()),
        (REFRESH_TOKEN_KEY, session.refresh_token.as_deref()),
        (EMAIL_KEY, session.email.as_deref()),
        (NAME_KEY, session.name.as_deref()),
    ])
}

/// Remove every session key
pub fn clear_session(store: &dyn SessionStore) -> Result<()> {
    save_session(store, &Session::empty())
}

/// Process-local store, mainly for tests and ephemeral hosts
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its key-value table
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create storage directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::init(conn)
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create session_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SessionStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM session_kv WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM session_kv WHERE key = ?", [key])?;
        Ok(())
    }

    fn write_all(&self, entries: &[(&str, Option<&str>)]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            match value {
                Some(value) => {
                    tx.execute(
                        "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM session_kv WHERE key = ?", [key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
