// # Memory Key-Value Store
//
// In-memory implementation of KeyValueStore.
//
// ## Purpose
//
// Provides a simple, fast backend that doesn't persist across restarts.
// Useful for testing and for embedding where the host owns durability.
//
// ## Crash Behavior
//
// - All geofence records are lost on restart/crash
// - Nothing can be re-armed after a device reboot

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::kv_store::KeyValueStore;

/// In-memory key-value store implementation
///
/// This implementation stores all values in a HashMap protected by a RwLock.
/// It provides no persistence across restarts.
///
/// # Example
///
/// ```rust,no_run
/// use geofence_core::state::MemoryKeyValueStore;
/// use geofence_core::traits::KeyValueStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryKeyValueStore::new();
///
///     store.put("geo:home", "{}").await?;
///     assert!(store.exists("geo:home").await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of keys in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Clear all keys, as if the process had died
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, Error> {
        let guard = self.inner.read().await;
        guard.get(key).cloned().ok_or_else(|| Error::not_found(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.inner.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
