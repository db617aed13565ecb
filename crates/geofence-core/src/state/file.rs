// # File Key-Value Store
//
// File-based implementation of KeyValueStore with crash recovery.
//
// ## Purpose
//
// Keeps geofence records on disk so they survive process death and device
// reboot.
//
// ## Sessions
//
// Nothing is cached between calls. Each operation takes an exclusive
// advisory lock on `<path>.lock`, reads the document, applies its change,
// writes it back and releases the lock. Every handle on the same path
// (including ones in other processes, such as geofencectl) is serialized
// this way.
//
// ## Crash Recovery
//
// - Atomic writes: Uniquely named temp file, fsync, then rename over the store
// - Corruption detection: Validates JSON on load
// - Automatic backup: `.backup` mirrors the last successfully written document
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "geo:home": "{\"id\":\"home\",\"lat\":37.0, ...}",
//     "config:webhook": "{\"url\":\"https://example.com/hook\"}"
//   }
// }
// ```

use async_trait::async_trait;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::kv_store::KeyValueStore;

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

type Entries = HashMap<String, String>;

/// File-based key-value store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use geofence_core::state::FileKeyValueStore;
/// use geofence_core::traits::KeyValueStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileKeyValueStore::new("/var/lib/geofence/store.json").await?;
///
///     // Atomically written to disk
///     store.put("geo:home", "{}").await?;
///     assert!(store.exists("geo:home").await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    // Keeps this handle's sessions off the blocking pool while another waits on the file lock
    session: Mutex<()>,
}

/// Serializable store file format
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    entries: Entries,
}

impl FileKeyValueStore {
    /// Create a file store, creating parent directories if needed
    ///
    /// An existing file is validated once so corruption is detected (and
    /// repaired from backup) at startup rather than on first use.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let store = Self {
            path,
            session: Mutex::new(()),
        };
        let entries = store.session(|entries| (entries.len(), false)).await?;
        tracing::debug!(path = %store.path.display(), entries, "Opened file store");

        Ok(store)
    }

    /// Path of the main store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one locked session
    ///
    /// `f` returns its result and whether it changed the entries; the file
    /// is only rewritten on change.
    async fn session<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Entries) -> (T, bool) + Send + 'static,
        T: Send + 'static,
    {
        let _session = self.session.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::locked_session(&path, f))
            .await
            .map_err(|e| Error::store_io(format!("Store session task failed: {}", e)))?
    }

    fn locked_session<T>(
        path: &Path,
        f: impl FnOnce(&mut Entries) -> (T, bool),
    ) -> Result<T, Error> {
        let lock_path = Self::lock_path(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                Error::store_io(format!(
                    "Failed to open lock file {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;
        lock_file.lock_exclusive().map_err(|e| {
            Error::store_io(format!(
                "Failed to lock store file {}: {}",
                lock_path.display(),
                e
            ))
        })?;

        let mut entries = Self::load_with_recovery(path)?;
        let (value, changed) = f(&mut entries);
        if changed {
            Self::write(path, entries)?;
        }

        // Released when lock_file drops
        drop(lock_file);
        Ok(value)
    }

    /// Load entries with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main store file
    /// 2. If it fails to parse, try loading backup
    /// 3. If backup also fails, start with empty state
    fn load_with_recovery(path: &Path) -> Result<Entries, Error> {
        match Self::load(path) {
            Ok(entries) => Ok(entries),
            Err(Error::Decode(reason)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    reason
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path) {
                    Ok(entries) => {
                        tracing::info!("Recovered store from backup: {} entries", entries.len());
                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path) {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(entries)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Load entries from file
    fn load(path: &Path) -> Result<Entries, Error> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::store_io(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let store_file: StoreFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::decode(format!(
                "Failed to parse store file {}: {}",
                path.display(),
                e
            ))
        })?;

        if store_file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                store_file.version
            );
        }

        Ok(store_file.entries)
    }

    /// Write entries to file atomically, then refresh the backup
    fn write(path: &Path, entries: Entries) -> Result<(), Error> {
        let store_file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            entries,
        };

        let json = serde_json::to_string_pretty(&store_file)
            .map_err(|e| Error::store_io(format!("Failed to serialize store: {}", e)))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Random name in the same directory so the rename stays on one filesystem
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            Error::store_io(format!(
                "Failed to create temp file in {}: {}",
                dir.display(),
                e
            ))
        })?;

        temp.write_all(json.as_bytes()).map_err(|e| {
            Error::store_io(format!(
                "Failed to write to temp file {}: {}",
                temp.path().display(),
                e
            ))
        })?;

        temp.as_file().sync_all().map_err(|e| {
            Error::store_io(format!(
                "Failed to sync temp file {}: {}",
                temp.path().display(),
                e
            ))
        })?;

        temp.persist(path).map_err(|e| {
            Error::store_io(format!(
                "Failed to replace {}: {}",
                path.display(),
                e.error
            ))
        })?;

        if let Err(e) = fs::copy(path, Self::backup_path(path)) {
            tracing::warn!("Failed to refresh backup: {}", e);
        }

        tracing::trace!("Store written to file: {}", path.display());
        Ok(())
    }

    /// Restore store file from backup
    fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).map_err(|e| {
            Error::store_io(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored store file from backup");
        Ok(())
    }

    /// Get path to the advisory lock file
    fn lock_path(path: &Path) -> PathBuf {
        let mut lock = path.to_path_buf();
        lock.set_extension("lock");
        lock
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let (key, value) = (key.to_string(), value.to_string());
        self.session(move |entries| {
            entries.insert(key, value);
            ((), true)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<String, Error> {
        let owned = key.to_string();
        self.session(move |entries| (entries.get(&owned).cloned(), false))
            .await?
            .ok_or_else(|| Error::not_found(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.session(move |entries| (entries.contains_key(&key), false))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.session(move |entries| ((), entries.remove(&key).is_some()))
            .await
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let prefix = prefix.to_string();
        self.session(move |entries| {
            let keys = entries
                .keys()
                .filter(|key| key.starts_with(&prefix))
                .cloned()
                .collect();
            (keys, false)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileKeyValueStore::new(&path).await.unwrap();

        // Initially empty
        assert!(store.enumerate("geo:").await.unwrap().is_empty());

        store.put("geo:home", "{\"id\":\"home\"}").await.unwrap();
        assert_eq!(store.get("geo:home").await.unwrap(), "{\"id\":\"home\"}");

        // Verify file was written
        assert!(path.exists());

        // A second instance sees the same data
        let store2 = FileKeyValueStore::new(&path).await.unwrap();
        assert!(store2.exists("geo:home").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_sees_writes_from_other_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store1 = FileKeyValueStore::new(&path).await.unwrap();
        let store2 = FileKeyValueStore::new(&path).await.unwrap();

        store1.put("geo:home", "1").await.unwrap();
        // No cached state: store2 reads the file on every call
        assert_eq!(store2.get("geo:home").await.unwrap(), "1");

        store2.delete("geo:home").await.unwrap();
        assert!(!store1.exists("geo:home").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_delete_missing_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileKeyValueStore::new(&path).await.unwrap();
        store.delete("geo:missing").await.unwrap();
        assert!(matches!(
            store.get("geo:missing").await,
            Err(Error::NotFound(_))
        ));
        // Nothing changed, nothing written
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileKeyValueStore::new(&path).await.unwrap();
        store.put("geo:home", "first").await.unwrap();

        // Write again to ensure backup is created
        store.put("geo:home", "second").await.unwrap();

        let backup_path = FileKeyValueStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        // Corrupt the store file
        fs::write(&path, b"corrupted json data").unwrap();

        let store2 = FileKeyValueStore::new(&path)
            .await
            .expect("Backup should have been recovered");
        // The backup mirrors the last successful write
        assert_eq!(store2.get("geo:home").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_file_store_corruption_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = FileKeyValueStore::new(&path).await.unwrap();
        assert!(store.enumerate("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileKeyValueStore::new(&path).await.unwrap();

        for i in 0..10 {
            store.put("geo:home", &i.to_string()).await.unwrap();
        }

        let store2 = FileKeyValueStore::new(&path).await.unwrap();
        assert_eq!(store2.get("geo:home").await.unwrap(), "9");

        // No temp files left behind
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["store.backup", "store.json", "store.lock"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_handles_share_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store1 = Arc::new(FileKeyValueStore::new(&path).await.unwrap());
        let store2 = Arc::new(FileKeyValueStore::new(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..25 {
            for (name, store) in [("a", &store1), ("b", &store2)] {
                let store = Arc::clone(store);
                tasks.push(tokio::spawn(async move {
                    store.put(&format!("geo:{}{}", name, i), "{}").await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store1.enumerate("geo:").await.unwrap().len(), 50);
        assert_eq!(
            FileKeyValueStore::new(&path)
                .await
                .unwrap()
                .enumerate("geo:")
                .await
                .unwrap()
                .len(),
            50
        );
    }
}
