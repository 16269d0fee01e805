//! In-memory implementation of the CacheService interface
//!
//! Caches live for the life of the process and are shared by every chain
//! execution holding the service.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use trellis_core::{CacheService, CoreError};

/// Process-local [`CacheService`] backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryCacheService {
    /// Map of cache name -> (key -> value)
    caches: DashMap<String, DashMap<String, Value>>,
}

impl InMemoryCacheService {
    /// Create an empty cache service
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of caches holding at least one entry
    pub fn cache_names(&self) -> BTreeSet<String> {
        self.caches
            .iter()
            .filter(|cache| !cache.value().is_empty())
            .map(|cache| cache.key().clone())
            .collect()
    }
}

impl CacheService for InMemoryCacheService {
    fn get(&self, cache: &str, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self
            .caches
            .get(cache)
            .and_then(|entries| entries.get(key).map(|v| v.value().clone())))
    }

    fn put(&self, cache: &str, key: &str, value: Value) -> Result<(), CoreError> {
        self.caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), value);
        debug!(cache, key, "Cached value");
        Ok(())
    }

    fn put_if_absent(&self, cache: &str, key: &str, value: Value) -> Result<(), CoreError> {
        let entries = self.caches.entry(cache.to_string()).or_default();
        let result = match entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(CoreError::Cache(format!(
                "key '{}' is already present in cache '{}'",
                key, cache
            ))),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        };
        result
    }

    fn remove(&self, cache: &str, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self
            .caches
            .get(cache)
            .and_then(|entries| entries.remove(key).map(|(_, v)| v)))
    }

    fn clear(&self, cache: &str) -> Result<(), CoreError> {
        if self.caches.remove(cache).is_some() {
            debug!(cache, "Cleared cache");
        }
        Ok(())
    }

    fn keys(&self, cache: &str) -> Result<BTreeSet<String>, CoreError> {
        Ok(self
            .caches
            .get(cache)
            .map(|entries| entries.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default())
    }

    fn values(&self, cache: &str) -> Result<Vec<Value>, CoreError> {
        let mut entries: Vec<(String, Value)> = self
            .caches
            .get(cache)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, v)| v).collect())
    }

    fn size(&self, cache: &str) -> Result<usize, CoreError> {
        Ok(self.caches.get(cache).map_or(0, |entries| entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_remove() {
        let service = InMemoryCacheService::new();
        service.put("c", "k", json!(1)).unwrap();
        assert_eq!(service.get("c", "k").unwrap(), Some(json!(1)));
        assert_eq!(service.get("other", "k").unwrap(), None);
        assert_eq!(service.remove("c", "k").unwrap(), Some(json!(1)));
        assert_eq!(service.get("c", "k").unwrap(), None);
    }

    #[test]
    fn test_put_if_absent_fails_when_present() {
        let service = InMemoryCacheService::new();
        service.put_if_absent("c", "k", json!("first")).unwrap();
        let err = service.put_if_absent("c", "k", json!("second")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cache error: key 'k' is already present in cache 'c'"
        );
        assert_eq!(service.get("c", "k").unwrap(), Some(json!("first")));
    }

    #[test]
    fn test_keys_values_and_clear() {
        let service = InMemoryCacheService::new();
        service.put("c", "b", json!(2)).unwrap();
        service.put("c", "a", json!(1)).unwrap();
        service.put("d", "x", json!(0)).unwrap();
        assert_eq!(
            service.keys("c").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(service.values("c").unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(service.size("c").unwrap(), 2);

        service.clear("c").unwrap();
        assert!(service.keys("c").unwrap().is_empty());
        assert_eq!(service.cache_names().into_iter().collect::<Vec<_>>(), vec!["d"]);
    }
}
