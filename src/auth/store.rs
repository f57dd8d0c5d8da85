// Credential storage
// Key-value backends holding the token pair under fixed keys

use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::types::{CredentialPair, StoreError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Client-side key-value storage for credentials
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local storage, lost when the process exits
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// SQLite-backed storage in an `auth_kv` table, survives restarts
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open (or create) the token database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        tracing::debug!("Opening token database: {}", path.display());
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory SQLite database, used by tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TokenStore for SqliteTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute("DELETE FROM auth_kv WHERE key = ?", [key])?;
        Ok(())
    }
}

/// Typed view of the credential pair over a [`TokenStore`]
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn TokenStore>,
}

impl Credentials {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(ACCESS_TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(REFRESH_TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    /// Persist a fresh pair after login
    pub fn save_pair(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.store.set(ACCESS_TOKEN_KEY, &pair.access)?;
        self.store.set(REFRESH_TOKEN_KEY, &pair.refresh)
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(ACCESS_TOKEN_KEY, token)
    }

    pub fn set_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(REFRESH_TOKEN_KEY, token)
    }

    pub fn clear_access_token(&self) -> Result<(), StoreError> {
        self.store.remove(ACCESS_TOKEN_KEY)
    }

    /// Remove both tokens
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)
    }
}
