//! SQLite implementation of the cache store backend.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, CacheStorage};
use crate::worker::types::{Response, ResponseType};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the storage at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("webinar-sw").join("caches.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named stores, rowid gives creation order
CREATE TABLE IF NOT EXISTS caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_id INTEGER NOT NULL,
    request_url TEXT NOT NULL,
    response_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_id, request_url),
    FOREIGN KEY (cache_id) REFERENCES caches(id) ON DELETE CASCADE
);
"#;

const SELECT_RESPONSE: &str =
  "SELECT ce.response_url, ce.status, ce.status_text, ce.response_type, ce.headers, ce.body
   FROM cache_entries ce
   INNER JOIN caches c ON c.id = ce.cache_id";

fn ensure_cache(conn: &Connection, cache: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache],
    )
    .map_err(|e| eyre!("Failed to create cache {}: {}", cache, e))?;

  conn
    .query_row(
      "SELECT id FROM caches WHERE name = ?",
      params![cache],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to look up cache {}: {}", cache, e))
}

/// Raw columns of a stored response, decoded after the row borrow ends.
type ResponseRow = (String, u16, String, String, String, Vec<u8>);

fn read_response_row(row: &Row<'_>) -> rusqlite::Result<ResponseRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode_response(row: ResponseRow) -> Result<Response> {
  let (url, status, status_text, response_type, headers, body) = row;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

  Ok(Response {
    url,
    status,
    status_text,
    response_type: response_type.parse::<ResponseType>()?,
    headers,
    body,
  })
}

impl CacheStorage for SqliteStorage {
  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn open_cache(&self, cache: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_cache(&conn, cache)?;
    Ok(())
  }

  fn has_cache(&self, cache: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found: Option<i64> = conn
      .query_row(
        "SELECT id FROM caches WHERE name = ?",
        params![cache],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", cache, e))?;

    Ok(found.is_some())
  }

  fn delete_cache(&self, cache: &str) -> Result<bool> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_id IN (SELECT id FROM caches WHERE name = ?)",
        params![cache],
      )
      .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", cache, e))?;

    let deleted = conn
      .execute("DELETE FROM caches WHERE name = ?", params![cache])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache, e))?;

    Ok(deleted > 0)
  }

  fn put(&self, cache: &str, key: &str, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    let cache_id = ensure_cache(&conn, cache)?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (cache_id, request_url, response_url, status, status_text, response_type, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          cache_id,
          key,
          response.url,
          response.status,
          response.status_text,
          response.response_type.as_str(),
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store {} in cache {}: {}", key, cache, e))?;

    Ok(())
  }

  fn match_in(&self, cache: &str, key: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        &format!("{} WHERE c.name = ? AND ce.request_url = ?", SELECT_RESPONSE),
        params![cache, key],
        read_response_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {} in cache {}: {}", key, cache, e))?;

    row.map(decode_response).transpose()
  }

  fn match_any(&self, key: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        &format!(
          "{} WHERE ce.request_url = ? ORDER BY c.id LIMIT 1",
          SELECT_RESPONSE
        ),
        params![key],
        read_response_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", key, e))?;

    row.map(decode_response).transpose()
  }

  fn entries(&self, cache: &str) -> Result<Vec<CacheEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT ce.request_url, ce.status, length(ce.body), ce.cached_at
         FROM cache_entries ce
         INNER JOIN caches c ON c.id = ce.cache_id
         WHERE c.name = ?
         ORDER BY ce.rowid",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let rows = stmt
      .query_map(params![cache], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, u16>(1)?,
          row.get::<_, i64>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    rows
      .into_iter()
      .map(|(key, status, size, cached_at)| {
        Ok(CacheEntry {
          key,
          status,
          size: usize::try_from(size).unwrap_or_default(),
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
