//! Cross-execution cache service interface
//!
//! Values are JSON documents grouped into named caches. Persistence and
//! clustering are the implementation's concern.

use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use crate::CoreError;

/// Cache name used for exports made by operation chains
pub const EXPORT_CACHE: &str = "exports";

/// Key of an export in [`EXPORT_CACHE`]
pub fn export_key(job_id: &str, key: &str) -> String {
    format!("{}:{}", job_id, key)
}

/// Named key/value caches shared across chain executions
pub trait CacheService: Send + Sync {
    /// Read a value
    fn get(&self, cache: &str, key: &str) -> Result<Option<JsonValue>, CoreError>;

    /// Write a value, replacing any existing one
    fn put(&self, cache: &str, key: &str, value: JsonValue) -> Result<(), CoreError>;

    /// Write a value, failing if the key is already present
    fn put_if_absent(&self, cache: &str, key: &str, value: JsonValue) -> Result<(), CoreError>;

    /// Remove a value, returning it
    fn remove(&self, cache: &str, key: &str) -> Result<Option<JsonValue>, CoreError>;

    /// Remove every value of a cache
    fn clear(&self, cache: &str) -> Result<(), CoreError>;

    /// Keys of a cache
    fn keys(&self, cache: &str) -> Result<BTreeSet<String>, CoreError>;

    /// Values of a cache
    fn values(&self, cache: &str) -> Result<Vec<JsonValue>, CoreError>;

    /// Number of entries in a cache
    fn size(&self, cache: &str) -> Result<usize, CoreError> {
        Ok(self.keys(cache)?.len())
    }
}
