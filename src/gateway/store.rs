//! Cache partition storage: trait, SQLite implementation, and a no-op.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// A response captured into a cache partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  /// Capture timestamp. API entries older than the TTL must not be
  /// served without revalidation.
  pub captured_at: DateTime<Utc>,
}

/// Trait for partitioned response stores.
///
/// A partition is a named key-response mapping, keyed by the full request
/// URL. Partitions are independent: dropping one never touches another.
pub trait CacheStore: Send + Sync {
  fn get(&self, partition: &str, url: &str) -> Result<Option<CachedResponse>>;

  fn put(&self, partition: &str, url: &str, response: &CachedResponse) -> Result<()>;

  fn delete(&self, partition: &str, url: &str) -> Result<()>;

  /// All URLs currently stored in a partition.
  fn urls(&self, partition: &str) -> Result<Vec<String>>;

  /// Names of every partition that currently holds at least one entry.
  fn partitions(&self) -> Result<Vec<String>>;

  fn drop_partition(&self, partition: &str) -> Result<()>;
}

/// Store that caches nothing. Used when caching is disabled - every
/// lookup misses and every write is discarded.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn get(&self, _partition: &str, _url: &str) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(&self, _partition: &str, _url: &str, _response: &CachedResponse) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _partition: &str, _url: &str) -> Result<()> {
    Ok(())
  }

  fn urls(&self, _partition: &str) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn drop_partition(&self, _partition: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-backed store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at an explicit location.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// In-memory store, handy for tests and throwaway runs.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("m3d").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
-- Captured responses, one row per (partition, URL)
CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    captured_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_name
    ON response_cache(cache_name);
"#;

/// Stable fixed-length key for a request URL.
fn hash_url(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStore for SqliteStore {
  fn get(&self, partition: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, content_type, body, captured_at FROM response_cache
         WHERE cache_name = ? AND url_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = stmt
      .query_row(params![partition, hash_url(url)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, content_type, body, captured_at)) => Ok(Some(CachedResponse {
        status,
        content_type,
        body,
        captured_at: parse_datetime(&captured_at)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, url: &str, response: &CachedResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache
         (cache_name, url_hash, url, status, content_type, body, captured_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          partition,
          hash_url(url),
          url,
          response.status,
          response.content_type,
          response.body,
          response.captured_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn delete(&self, partition: &str, url: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE cache_name = ? AND url_hash = ?",
        params![partition, hash_url(url)],
      )
      .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;

    Ok(())
  }

  fn urls(&self, partition: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT url FROM response_cache WHERE cache_name = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![partition], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query urls: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(urls)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_name FROM response_cache ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn drop_partition(&self, partition: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE cache_name = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to drop partition: {}", e))?;

    Ok(())
  }
}

/// Parse an RFC 3339 timestamp stored by `put`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
