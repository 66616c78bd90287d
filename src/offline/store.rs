//! Named cache generations holding buffered responses.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::http::Response;
use crate::db::Database;

/// Stable fixed-length key for a request (method + URL).
pub fn request_key(method: &str, url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(method.to_ascii_uppercase().as_bytes());
  hasher.update(b" ");
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

/// Trait for response cache backends.
pub trait ResponseStore: Send + Sync {
  /// Names of all existing generations, oldest first.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Create the generation if it does not exist yet.
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Store a response for `url` in `cache_name`, creating the generation as needed.
  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()>;

  /// Find a response for `url` in any generation, oldest generation first.
  fn lookup(&self, url: &str) -> Result<Option<Response>>;

  /// Drop a generation and its entries. Returns whether it existed.
  fn delete(&self, cache_name: &str) -> Result<bool>;
}

/// In-memory generations.
#[derive(Default)]
pub struct MemoryResponseStore {
  caches: Mutex<Vec<(String, HashMap<String, Response>)>>,
}

impl MemoryResponseStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ResponseStore for MemoryResponseStore {
  fn cache_names(&self) -> Result<Vec<String>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.iter().map(|(name, _)| name.clone()).collect())
  }

  fn open(&self, cache_name: &str) -> Result<()> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if !caches.iter().any(|(name, _)| name == cache_name) {
      caches.push((cache_name.to_string(), HashMap::new()));
    }
    Ok(())
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    self.open(cache_name)?;
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if let Some((_, entries)) = caches.iter_mut().find(|(name, _)| name == cache_name) {
      entries.insert(request_key("GET", url), response.clone());
    }
    Ok(())
  }

  fn lookup(&self, url: &str) -> Result<Option<Response>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let key = request_key("GET", url);
    Ok(
      caches
        .iter()
        .find_map(|(_, entries)| entries.get(&key))
        .cloned(),
    )
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = caches.len();
    caches.retain(|(name, _)| name != cache_name);
    Ok(caches.len() != before)
  }
}

/// SQLite-based generations.
pub struct SqliteResponseStore {
  db: Arc<Database>,
}

impl SqliteResponseStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl ResponseStore for SqliteResponseStore {
  fn cache_names(&self) -> Result<Vec<String>> {
    self.db.with_conn(|conn| {
      let mut stmt =
        conn.prepare("SELECT name FROM cache_generations ORDER BY created_at, rowid")?;
      let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(names)
    })
  }

  fn open(&self, cache_name: &str) -> Result<()> {
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
        params![cache_name],
      )
    })?;
    Ok(())
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    self.open(cache_name)?;
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO response_cache (cache_name, request_key, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          cache_name,
          request_key("GET", url),
          url,
          response.status,
          headers,
          response.body
        ],
      )
    })?;
    Ok(())
  }

  fn lookup(&self, url: &str) -> Result<Option<Response>> {
    let key = request_key("GET", url);
    let row: Option<(u16, String, Vec<u8>)> = self.db.with_conn(|conn| {
      conn
        .query_row(
          "SELECT rc.status, rc.headers, rc.body FROM response_cache rc
           INNER JOIN cache_generations cg ON cg.name = rc.cache_name
           WHERE rc.request_key = ?
           ORDER BY cg.created_at, cg.rowid
           LIMIT 1",
          params![key],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
    })?;

    match row {
      Some((status, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to parse cached headers for {}: {}", url, e))?;
        Ok(Some(Response {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let removed = self.db.with_conn(|conn| {
      conn.execute(
        "DELETE FROM response_cache WHERE cache_name = ?",
        params![cache_name],
      )?;
      conn.execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![cache_name],
      )
    })?;
    Ok(removed > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stores() -> Vec<Box<dyn ResponseStore>> {
    vec![
      Box::new(MemoryResponseStore::new()),
      Box::new(SqliteResponseStore::new(Arc::new(
        Database::open_in_memory().unwrap(),
      ))),
    ]
  }

  #[test]
  fn test_request_key_is_stable_hex() {
    let key = request_key("get", "/api/machines");
    assert_eq!(key.len(), 64);
    assert_eq!(key, request_key("GET", "/api/machines"));
    assert_ne!(key, request_key("GET", "/api/machines?status=running"));
  }

  #[test]
  fn test_put_then_lookup() {
    for store in stores() {
      let response = Response::new(200, b"[1]".to_vec());
      store.put("imcs-api-v1", "/api/machines", &response).unwrap();
      assert_eq!(store.lookup("/api/machines").unwrap(), Some(response));
      assert_eq!(store.lookup("/api/alerts").unwrap(), None);
    }
  }

  #[test]
  fn test_delete_generation_drops_entries() {
    for store in stores() {
      store
        .put("imcs-api-v1", "/api/machines", &Response::new(200, b"[]".to_vec()))
        .unwrap();
      store.open("imcs-api-v2").unwrap();
      assert!(store.delete("imcs-api-v1").unwrap());
      assert!(!store.delete("imcs-api-v1").unwrap());
      assert_eq!(store.lookup("/api/machines").unwrap(), None);
      assert_eq!(store.cache_names().unwrap(), vec!["imcs-api-v2".to_string()]);
    }
  }

  #[test]
  fn test_headers_survive_storage() {
    for store in stores() {
      let mut response = Response::new(200, b"{}".to_vec());
      response
        .headers
        .push(("Content-Type".to_string(), "application/json".to_string()));
      store.put("static", "/", &response).unwrap();
      let cached = store.lookup("/").unwrap().unwrap();
      assert_eq!(cached.header("content-type"), Some("application/json"));
    }
  }
}
