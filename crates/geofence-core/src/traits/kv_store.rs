// # Key-Value Store Trait
//
// Defines the durability layer under the geofence store.
//
// ## Purpose
//
// The backend maps string keys to serialized text records. Record kinds are
// kept apart by key prefix (`geo:`, `err:`) or by fixed singleton keys; the
// backend itself knows nothing about geofences.
//
// ## Sessions
//
// Every method is one self-contained session: acquire the underlying
// storage, operate, release. No handle outlives a call, so callers can hold
// results across `.await` points without pinning storage resources.
//
// ## Implementations
//
// - In-memory: `MemoryKeyValueStore`
// - File-based: `FileKeyValueStore` (single JSON document, atomic writes)

use async_trait::async_trait;

/// Trait for key-value store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks. The
/// backend is responsible for serializing concurrent writers.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking to serialize writers
///
/// ## Forbidden Capabilities
/// - ❌ Interpret record contents (owned by `GeofenceStore`)
/// - ❌ Spawn background tasks
/// - ❌ Hold storage handles open between calls
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write a value, replacing any existing one
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Durably written
    /// - `Err(Error::StoreIo)`: Storage failure
    async fn put(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Read a value
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The stored value
    /// - `Err(Error::NotFound)`: No value under `key`
    /// - `Err(Error::StoreIo)`: Storage failure
    async fn get(&self, key: &str) -> Result<String, crate::Error>;

    /// Check whether a key is present
    async fn exists(&self, key: &str) -> Result<bool, crate::Error>;

    /// Delete a value
    ///
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), crate::Error>;

    /// List every key starting with `prefix`
    ///
    /// Order is unspecified; callers must treat the result as a set.
    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>, crate::Error>;
}
