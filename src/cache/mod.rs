//! Named cache stores for offline support.
//!
//! Each store maps request URLs to full responses (status, headers, body).
//! Stores are identified by name and pruned as a whole, never per entry.

mod storage;
mod traits;

pub use storage::SqliteStorage;
pub use traits::CacheStorage;
