//! Local cache adapter.
//!
//! A typed JSON layer over a string-keyed, string-valued persistent store.
//! Reads and writes are fail-soft: storage and parse errors are logged and
//! the caller keeps working from the in-memory value.

mod storage;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use storage::{FileStorage, KeyValueStore, MemoryStorage, StorageError, StorageResult};

/// Typed JSON cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// In-memory cache, mostly useful for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Read `key`, falling back to `fallback`.
    ///
    /// A missing key is seeded with `fallback`. Unreadable or unparsable
    /// values are logged and replaced by `fallback` without touching storage.
    pub fn get<T>(&self, key: &str, fallback: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        match self.try_get::<T>(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                self.set(key, &fallback);
                fallback
            }
            Err(error) => {
                tracing::warn!("Failed to read {} from local cache: {}", key, error);
                fallback
            }
        }
    }

    /// Read and parse `key` without any fallback handling.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.store.get_item(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write `value`. Errors are logged; returns whether the
    /// write reached storage.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.try_set(key, value) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("Failed to write {} to local cache: {}", key, error);
                false
            }
        }
    }

    pub fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set_item(key, &raw)
    }

    /// Bind an in-memory handle to `key`, loaded with [`LocalCache::get`].
    pub fn bind<T>(&self, key: impl Into<String>, fallback: T) -> CachedValue<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let key = key.into();
        let value = self.get(&key, fallback.clone());
        CachedValue {
            cache: self.clone(),
            key,
            fallback,
            value,
        }
    }
}

/// In-memory value mirrored to one cache key on every mutation.
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    cache: LocalCache,
    key: String,
    fallback: T,
    value: T,
}

impl<T> CachedValue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn get(&self) -> &T {
        &self.value
    }

    /// Replace the value and write it through.
    pub fn set(&mut self, value: T) -> bool {
        self.value = value;
        self.persist()
    }

    /// Mutate in place and write the result through.
    pub fn update<R>(&mut self, mutate: impl FnOnce(&mut T) -> R) -> R {
        let result = mutate(&mut self.value);
        self.persist();
        result
    }

    /// Rebind the in-memory value to the fallback. Storage is left untouched
    /// until the next write.
    pub fn reset(&mut self) {
        self.value = self.fallback.clone();
    }

    fn persist(&self) -> bool {
        self.cache.set(&self.key, &self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[test]
    fn get_missing_key_seeds_fallback() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = LocalCache::new(storage.clone());

        let value = cache.get("missing-key", json!({"a": 1}));

        assert_eq!(value, json!({"a": 1}));
        assert_eq!(
            storage.get_item("missing-key").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[test]
    fn get_returns_fallback_on_corrupt_value_without_overwriting() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("broken", "{not json").unwrap();
        let cache = LocalCache::new(storage.clone());

        let value: Value = cache.get("broken", json!([]));

        assert_eq!(value, json!([]));
        assert_eq!(
            storage.get_item("broken").unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn set_swallows_quota_errors() {
        let cache = LocalCache::new(Arc::new(MemoryStorage::with_quota(8)));
        assert!(!cache.set("big", &"x".repeat(64)));
        assert!(cache.set("ok", &1));
    }

    #[test]
    fn cached_value_writes_through_and_resets_in_memory_only() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = LocalCache::new(storage.clone());
        let mut counter = cache.bind("counter", 0_u32);

        counter.update(|value| *value += 5);
        assert_eq!(*counter.get(), 5);
        assert_eq!(storage.get_item("counter").unwrap().as_deref(), Some("5"));

        counter.reset();
        assert_eq!(*counter.get(), 0);
        assert_eq!(storage.get_item("counter").unwrap().as_deref(), Some("5"));

        counter.set(2);
        assert_eq!(storage.get_item("counter").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn bind_loads_existing_value() {
        let cache = LocalCache::in_memory();
        cache.set("names", &vec!["a".to_string()]);
        let names = cache.bind("names", Vec::<String>::new());
        assert_eq!(names.get(), &vec!["a".to_string()]);
        assert_eq!(names.key(), "names");
    }
}
