//! Numbered schema migrations. Index `n` upgrades `user_version` from `n` to `n + 1`;
//! entries are append-only.

pub const MIGRATIONS: &[&str] = &[
  // 1: per-view key-value cache
  r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
  // 2: request router cache generations
  r#"
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key),
    FOREIGN KEY (cache_name) REFERENCES cache_generations(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_response_cache_key ON response_cache(request_key);
"#,
  // 3: dataset object store
  r#"
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    dataset_type TEXT NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_datasets_name ON datasets(name);
CREATE INDEX IF NOT EXISTS idx_datasets_type ON datasets(dataset_type);
"#,
];
