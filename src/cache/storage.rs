//! Key-value storage backends for the local response cache.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::Database;

/// Trait for durable string key-value stores.
pub trait KeyValueStore: Send + Sync {
  /// Get the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key` if present.
  fn remove(&self, key: &str) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl KeyValueStore for NoopStore {
  fn get(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// In-memory store, lost on exit.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }
}

/// SQLite-based key-value store.
pub struct SqliteStore {
  db: Arc<Database>,
}

impl SqliteStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    self.db.with_conn(|conn| {
      conn
        .query_row(
          "SELECT value FROM kv_cache WHERE key = ?",
          params![key],
          |row| row.get(0),
        )
        .optional()
    })
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO kv_cache (key, value) VALUES (?, ?)",
        params![key, value],
      )
    })?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self
      .db
      .with_conn(|conn| conn.execute("DELETE FROM kv_cache WHERE key = ?", params![key]))?;
    Ok(())
  }
}
