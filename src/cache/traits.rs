//! Core traits and types for named cache stores.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::worker::types::Response;

/// Summary of one stored entry, used for listing a store's contents.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Request URL the response is stored under
  pub key: String,
  pub status: u16,
  /// Size of the stored body in bytes
  pub size: usize,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named stores. Each store maps a request URL
/// to a response. Stores remember the order they were created in, which is
/// the order `match_any` searches them.
pub trait CacheStorage: Send + Sync {
  /// Names of all stores, oldest first.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Create the store if it does not exist yet.
  fn open_cache(&self, cache: &str) -> Result<()>;

  /// Whether a store with this name exists.
  fn has_cache(&self, cache: &str) -> Result<bool>;

  /// Delete a store and all of its entries. Returns false if there was none.
  fn delete_cache(&self, cache: &str) -> Result<bool>;

  /// Store a response under `key`, creating the store if needed.
  fn put(&self, cache: &str, key: &str, response: &Response) -> Result<()>;

  /// Look up `key` in one store.
  fn match_in(&self, cache: &str, key: &str) -> Result<Option<Response>>;

  /// Look up `key` across all stores, oldest store first.
  fn match_any(&self, key: &str) -> Result<Option<Response>>;

  /// Entries of one store, in insertion order.
  fn entries(&self, cache: &str) -> Result<Vec<CacheEntry>>;
}
