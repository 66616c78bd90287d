//! Local response cache for offline-first views.
//!
//! Views render whatever is cached under their key right away, then refresh
//! from the network and overwrite the entry. Entries carry their save time and
//! are ignored (not deleted) once older than the caller's TTL.

mod local;
mod storage;

pub use local::LocalCache;
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
