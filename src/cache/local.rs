//! Per-view response cache with time-to-live.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::storage::KeyValueStore;

/// Envelope persisted for every cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  /// Save time in milliseconds since the Unix epoch
  #[serde(rename = "ts")]
  pub timestamp: i64,
  pub value: T,
}

impl<T> CacheEntry<T> {
  /// Whether the entry is still within `max_age` at `now_ms`.
  pub fn is_fresh(&self, max_age: Duration, now_ms: i64) -> bool {
    let age = now_ms.saturating_sub(self.timestamp);
    // Entries from the future (clock skew) count as fresh
    age <= 0 || (age as u128) <= max_age.as_millis()
  }
}

/// Key-value cache that never fails.
///
/// Storage errors (full disk, locked database, corrupt entries) are logged and
/// treated as a cache miss, so callers can always fall through to the network.
#[derive(Clone)]
pub struct LocalCache {
  store: Arc<dyn KeyValueStore>,
}

impl LocalCache {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// Store `value` under `key` stamped with the current time.
  pub fn save<T: Serialize>(&self, key: &str, value: &T) {
    self.save_at(key, value, Utc::now().timestamp_millis());
  }

  fn save_at<T: Serialize>(&self, key: &str, value: &T, timestamp: i64) {
    let entry = CacheEntry { timestamp, value };
    let raw = match serde_json::to_string(&entry) {
      Ok(raw) => raw,
      Err(e) => {
        debug!(key, error = %e, "cache entry not serializable");
        return;
      }
    };
    if let Err(e) = self.store.set(key, &raw) {
      debug!(key, error = %e, "cache save failed");
    }
  }

  /// Load the value under `key` if it was saved within `max_age`.
  pub fn load<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
    self.load_at(key, max_age, Utc::now().timestamp_millis())
  }

  fn load_at<T: DeserializeOwned>(&self, key: &str, max_age: Duration, now_ms: i64) -> Option<T> {
    let raw = match self.store.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        debug!(key, error = %e, "cache load failed");
        return None;
      }
    };

    let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        debug!(key, error = %e, "discarding undecodable cache entry");
        return None;
      }
    };

    if entry.is_fresh(max_age, now_ms) {
      Some(entry.value)
    } else {
      None
    }
  }

  /// Load regardless of age.
  pub fn load_any<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.load(key, Duration::MAX)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStore;
  use color_eyre::{eyre::eyre, Result};

  struct BrokenStore;

  impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Err(eyre!("storage unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("quota exceeded"))
    }

    fn remove(&self, _key: &str) -> Result<()> {
      Err(eyre!("storage unavailable"))
    }
  }

  fn cache() -> LocalCache {
    LocalCache::new(Arc::new(MemoryStore::new()))
  }

  #[test]
  fn test_save_then_load_returns_value() {
    let cache = cache();
    cache.save("dh_summary", &vec![1, 2, 3]);
    let loaded: Option<Vec<i32>> = cache.load("dh_summary", Duration::from_secs(60));
    assert_eq!(loaded, Some(vec![1, 2, 3]));
  }

  #[test]
  fn test_expired_entry_is_absent() {
    let cache = cache();
    let now = Utc::now().timestamp_millis();
    cache.save_at("dh_alerts", &"payload", now - 61_000);
    let loaded: Option<String> = cache.load_at("dh_alerts", Duration::from_secs(60), now);
    assert_eq!(loaded, None);
  }

  #[test]
  fn test_entry_at_exact_ttl_is_valid() {
    let cache = cache();
    let now = Utc::now().timestamp_millis();
    cache.save_at("k", &5, now - 60_000);
    let loaded: Option<i32> = cache.load_at("k", Duration::from_secs(60), now);
    assert_eq!(loaded, Some(5));
  }

  #[test]
  fn test_expired_entry_is_not_deleted() {
    let cache = cache();
    let now = Utc::now().timestamp_millis();
    cache.save_at("k", &5, now - 3_600_000);
    assert_eq!(cache.load_at::<i32>("k", Duration::from_secs(1), now), None);
    assert_eq!(cache.load_any::<i32>("k"), Some(5));
  }

  #[test]
  fn test_storage_failures_are_swallowed() {
    let cache = LocalCache::new(Arc::new(BrokenStore));
    cache.save("k", &1);
    assert_eq!(cache.load::<i32>("k", Duration::from_secs(60)), None);
  }

  #[test]
  fn test_undecodable_entry_reads_as_miss() {
    let store = Arc::new(MemoryStore::new());
    store.set("k", "not json").unwrap();
    let cache = LocalCache::new(store);
    assert_eq!(cache.load::<i32>("k", Duration::from_secs(60)), None);
  }

  #[test]
  fn test_entry_wire_format() {
    let store = Arc::new(MemoryStore::new());
    let cache = LocalCache::new(store.clone());
    cache.save_at("k", &serde_json::json!({"a": 1}), 42);
    let raw = store.get("k").unwrap().unwrap();
    assert_eq!(raw, r#"{"ts":42,"value":{"a":1}}"#);
  }
}
