pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Shared SQLite database backing the local cache, response cache and dataset store.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at the given path
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    info!(path = %path.display(), version = db.schema_version()?, "database ready");

    Ok(db)
  }

  /// Open a throwaway in-memory database (tests, disabled persistence)
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Apply every migration newer than the stored `user_version`.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let current: usize = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

    for (idx, migration) in schema::MIGRATIONS.iter().enumerate().skip(current) {
      let version = idx + 1;
      debug!(version, "applying migration");
      conn
        .execute_batch(migration)
        .map_err(|e| eyre!("Failed to run migration {}: {}", version, e))?;
      conn
        .pragma_update(None, "user_version", version)
        .map_err(|e| eyre!("Failed to record schema version {}: {}", version, e))?;
    }

    Ok(())
  }

  /// Run a closure against the locked connection.
  pub fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> rusqlite::Result<T>,
  {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    f(&conn).map_err(|e| eyre!("Database error: {}", e))
  }

  /// Current schema version
  pub fn schema_version(&self) -> Result<usize> {
    self.with_conn(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get(0)))
  }
}

/// Per-user data directory (`$XDG_DATA_HOME/imcs`).
pub fn default_data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("imcs"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_reach_latest_version() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.schema_version().unwrap(), schema::MIGRATIONS.len());
  }

  #[test]
  fn test_migrations_are_not_reapplied() {
    let db = Database::open_in_memory().unwrap();
    // A second run must skip everything already applied
    db.run_migrations().unwrap();
    assert_eq!(db.schema_version().unwrap(), schema::MIGRATIONS.len());
  }

  #[test]
  fn test_open_creates_parent_directory() {
    let dir = std::env::temp_dir().join(format!("imcs-db-test-{}", std::process::id()));
    let path = dir.join("nested").join("imcs.db");
    let db = Database::open(&path).unwrap();
    assert!(path.exists());
    drop(db);
    let _ = std::fs::remove_dir_all(&dir);
  }
}
