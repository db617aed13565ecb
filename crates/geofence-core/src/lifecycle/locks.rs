//! Per-id serialization of lifecycle operations

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map of geofence id to an async mutex
///
/// Entries are held weakly: a mutex lives only while some task holds or
/// waits on its guard, and dead entries are swept on the next lookup.
#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    inner: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl IdLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`
    pub(crate) async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            // The map is never left half-updated, so a poisoned lock is still usable
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, entry| entry.strong_count() > 0);

            match map.get(id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let created = Arc::new(AsyncMutex::new(()));
                    map.insert(id.to_string(), Arc::downgrade(&created));
                    created
                }
            }
        };

        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|entry| entry.strong_count() > 0).count()
    }
}
