//! Persistent store for daily records.
//!
//! Records are flat field maps keyed by `YYYY-MM-DD` within a named table.
//! The SQLite backend keeps one row per date with the record as JSON text.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::config::{StoreBackend, StoreConfig};
use common::{CacheKey, Error, Fields, Result};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Key-value store with one record per (table, date).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Record stored under `key`, including its `date` field.
    async fn get(&self, table: &str, key: &CacheKey) -> Result<Option<Fields>>;

    /// Insert or replace the record under `key`.
    async fn put(&self, table: &str, key: &CacheKey, record: Fields) -> Result<()>;
}

/// Build the store selected by config.
pub fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn SnapshotStore>> {
    match cfg.backend {
        StoreBackend::Sqlite => {
            info!("Using SQLite store at {}", cfg.path);
            Ok(Arc::new(SqliteStore::open(&cfg.path)?))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; records are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

// ── In-memory ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), Fields>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, table: &str, key: &CacheKey) -> Result<Option<Fields>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(table.to_string(), key.as_str().to_string()))
            .cloned())
    }

    async fn put(&self, table: &str, key: &CacheKey, record: Fields) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert((table.to_string(), key.as_str().to_string()), record);
        Ok(())
    }
}

// ── SQLite ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "table name {table:?} must match [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool, creating
    /// `table` first if needed.
    async fn with_table<T, F>(&self, table: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> rusqlite::Result<T> + Send + 'static,
    {
        validate_table_name(table)?;
        let conn = Arc::clone(&self.conn);
        let table = table.to_string();

        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Store("connection mutex poisoned".into()))?;
            guard.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" (date TEXT PRIMARY KEY, item TEXT NOT NULL)"
                ),
                [],
            )
            .map_err(store_err)?;
            f(&*guard, &table).map_err(store_err)
        })
        .await
        .map_err(|e| Error::Store(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn get(&self, table: &str, key: &CacheKey) -> Result<Option<Fields>> {
        let date = key.as_str().to_string();
        let raw: Option<String> = self
            .with_table(table, move |conn, table| {
                conn.query_row(
                    &format!("SELECT item FROM \"{table}\" WHERE date = ?1"),
                    [&date],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        debug!("SQLite get {}/{}: hit={}", table, key, raw.is_some());
        match raw {
            // A corrupt item surfaces as Error::Json, not Error::Store.
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, table: &str, key: &CacheKey, record: Fields) -> Result<()> {
        let date = key.as_str().to_string();
        let text = serde_json::to_string(&record)?;
        self.with_table(table, move |conn, table| {
            conn.execute(
                &format!("INSERT OR REPLACE INTO \"{table}\" (date, item) VALUES (?1, ?2)"),
                [&date, &text],
            )
        })
        .await?;

        debug!("SQLite put {}/{} ({} fields)", table, key, record.len());
        Ok(())
    }
}
