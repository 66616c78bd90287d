use chrono::SecondsFormat;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::sync::Arc;
use tracing::debug;

use super::model::{Dataset, DatasetType};
use crate::db::Database;

/// Durable dataset storage keyed by dataset id.
///
/// Calls run on the blocking pool so the UI task never waits on SQLite.
#[derive(Clone)]
pub struct DatasetStore {
  db: Arc<Database>,
}

impl DatasetStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Insert or replace by id. Last write wins.
  pub async fn put(&self, dataset: &Dataset) -> Result<()> {
    let data =
      serde_json::to_vec(dataset).map_err(|e| eyre!("Failed to encode dataset: {}", e))?;
    let id = dataset.id.clone();
    let name = dataset.name.clone();
    let kind = dataset.dataset_type.as_str();
    let created_at = dataset
      .created_at
      .to_rfc3339_opts(SecondsFormat::Micros, true);

    self
      .blocking(move |db| {
        db.with_conn(|conn| {
          conn.execute(
            "INSERT OR REPLACE INTO datasets (id, name, dataset_type, data, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![id, name, kind, data, created_at],
          )
        })?;
        debug!(id = %id, "stored dataset");
        Ok(())
      })
      .await
  }

  pub async fn get(&self, id: &str) -> Result<Option<Dataset>> {
    let id = id.to_string();
    let data: Option<Vec<u8>> = self
      .blocking(move |db| {
        db.with_conn(|conn| {
          conn
            .query_row(
              "SELECT data FROM datasets WHERE id = ?",
              params![id],
              |row| row.get(0),
            )
            .optional()
        })
      })
      .await?;

    data.map(|bytes| decode(&bytes)).transpose()
  }

  /// Every stored dataset, oldest first.
  pub async fn get_all(&self) -> Result<Vec<Dataset>> {
    self
      .query_all("SELECT data FROM datasets ORDER BY created_at, id", None)
      .await
  }

  /// Datasets of one type, via the type index.
  pub async fn get_by_type(&self, dataset_type: DatasetType) -> Result<Vec<Dataset>> {
    self
      .query_all(
        "SELECT data FROM datasets WHERE dataset_type = ? ORDER BY created_at, id",
        Some(dataset_type.as_str().to_string()),
      )
      .await
  }

  /// Returns whether a dataset was removed.
  pub async fn delete(&self, id: &str) -> Result<bool> {
    let id = id.to_string();
    let removed = self
      .blocking(move |db| {
        db.with_conn(|conn| conn.execute("DELETE FROM datasets WHERE id = ?", params![id]))
      })
      .await?;
    Ok(removed > 0)
  }

  async fn query_all(&self, sql: &'static str, arg: Option<String>) -> Result<Vec<Dataset>> {
    let blobs: Vec<Vec<u8>> = self
      .blocking(move |db| {
        db.with_conn(|conn| {
          let mut stmt = conn.prepare(sql)?;
          let rows = stmt.query_map(params_from_iter(arg.iter()), |row| row.get(0))?;
          rows.collect::<rusqlite::Result<Vec<Vec<u8>>>>()
        })
      })
      .await?;

    blobs.iter().map(|bytes| decode(bytes)).collect()
  }

  async fn blocking<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
  {
    let db = Arc::clone(&self.db);
    tokio::task::spawn_blocking(move || f(&db))
      .await
      .map_err(|e| eyre!("Dataset store task failed: {}", e))?
  }
}

fn decode(bytes: &[u8]) -> Result<Dataset> {
  serde_json::from_slice(bytes).map_err(|e| eyre!("Failed to decode stored dataset: {}", e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::import::import_csv;

  fn store() -> DatasetStore {
    DatasetStore::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn test_put_get_roundtrip() {
    let store = store();
    let dataset = import_csv("speeds", "line,speed\nL1,10\nL2,12").unwrap();
    store.put(&dataset).await.unwrap();

    let loaded = store.get(&dataset.id).await.unwrap().unwrap();
    assert_eq!(loaded, dataset);
    assert!(store.get("dataset_0").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_get_all_in_creation_order_and_delete() {
    let store = store();
    let first = import_csv("first", "a\n1").unwrap();
    let second = import_csv("second", "b\nx").unwrap();
    store.put(&second).await.unwrap();
    store.put(&first).await.unwrap();

    let names: Vec<String> = store
      .get_all()
      .await
      .unwrap()
      .into_iter()
      .map(|d| d.name)
      .collect();
    assert_eq!(names, vec!["first", "second"]);

    assert!(store.delete(&first.id).await.unwrap());
    assert!(!store.delete(&first.id).await.unwrap());
    assert_eq!(store.get_all().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_put_replaces_same_id() {
    let store = store();
    let mut dataset = import_csv("v1", "a\n1").unwrap();
    store.put(&dataset).await.unwrap();
    dataset.name = "v2".to_string();
    store.put(&dataset).await.unwrap();

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "v2");
  }

  #[tokio::test]
  async fn test_get_by_type() {
    let store = store();
    store.put(&import_csv("n", "a\n1").unwrap()).await.unwrap();
    store.put(&import_csv("t", "a\nx").unwrap()).await.unwrap();

    let numeric = store.get_by_type(DatasetType::Numeric).await.unwrap();
    assert_eq!(numeric.len(), 1);
    assert_eq!(numeric[0].name, "n");
  }
}
