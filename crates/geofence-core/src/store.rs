//! Namespaced geofence store
//!
//! [`GeofenceStore`] layers the four record kinds over a [`KeyValueStore`]:
//!
//! | Kind                    | Key                          |
//! |-------------------------|------------------------------|
//! | Geofence                | `geo:<id>`                   |
//! | Erroneous geofence      | `err:<id>`                   |
//! | Webhook configuration   | `config:webhook`             |
//! | Notification config     | `config:notification`        |
//!
//! Enumerating a geofence namespace prunes lazily: expired records are
//! deleted as a side effect of the scan and never returned. There is no
//! background timer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::delivery::{NotificationConfiguration, WebhookConfiguration};
use crate::error::{Error, Result};
use crate::geofence::Geofence;
use crate::traits::KeyValueStore;

/// Key prefix for registered geofences
pub const GEOFENCE_KEY_PREFIX: &str = "geo:";

/// Key prefix for geofences awaiting re-registration
pub const ERRONEOUS_GEOFENCE_KEY_PREFIX: &str = "err:";

/// Singleton key for the webhook configuration
pub const WEBHOOK_CONFIG_KEY: &str = "config:webhook";

/// Singleton key for the notification configuration
pub const NOTIFICATION_CONFIG_KEY: &str = "config:notification";

/// Result of scanning one geofence namespace
#[derive(Debug, Clone, Default)]
pub struct NamespaceScan {
    /// Non-expired geofences
    pub active: Vec<Geofence>,
    /// Ids whose records expired and were deleted by this scan
    pub expired: Vec<String>,
    /// Keys whose records could not be decoded (left in place)
    pub malformed: Vec<String>,
}

/// Durable geofence and configuration records
#[derive(Clone)]
pub struct GeofenceStore {
    backend: Arc<dyn KeyValueStore>,
}

impl GeofenceStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Underlying key-value backend
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    // ---- geofences ----

    /// Save (or replace) a geofence record
    pub async fn save_geofence(&self, geofence: &Geofence) -> Result<()> {
        let record = geofence.to_record()?;
        self.backend
            .put(&geofence_key(geofence.id()), &record)
            .await?;
        debug!(geofence_id = geofence.id(), "Geofence saved to store");
        Ok(())
    }

    /// Load a geofence record, `None` if absent
    pub async fn get_geofence(&self, id: &str) -> Result<Option<Geofence>> {
        self.load(&geofence_key(id)).await
    }

    /// Delete a geofence record; missing records are fine
    pub async fn remove_geofence(&self, id: &str) -> Result<()> {
        self.backend.delete(&geofence_key(id)).await?;
        debug!(geofence_id = id, "Geofence removed from store");
        Ok(())
    }

    /// Scan the geofence namespace, pruning expired records
    pub async fn scan_geofences(&self) -> Result<NamespaceScan> {
        self.scan(GEOFENCE_KEY_PREFIX).await
    }

    /// Non-expired geofences, pruning expired records
    pub async fn active_geofences(&self) -> Result<Vec<Geofence>> {
        Ok(self.scan_geofences().await?.active)
    }

    /// Ids present in the geofence namespace, without decoding or pruning
    pub async fn geofence_ids(&self) -> Result<Vec<String>> {
        self.ids(GEOFENCE_KEY_PREFIX).await
    }

    // ---- erroneous geofences ----

    /// Copy geofences into the erroneous namespace
    pub async fn save_erroneous_geofences(&self, geofences: &[Geofence]) -> Result<()> {
        for geofence in geofences {
            let record = geofence.to_record()?;
            self.backend
                .put(&erroneous_key(geofence.id()), &record)
                .await?;
            debug!(geofence_id = geofence.id(), "Erroneous geofence saved to store");
        }
        Ok(())
    }

    /// Copy one geofence into the erroneous namespace
    pub async fn save_erroneous_geofence(&self, geofence: &Geofence) -> Result<()> {
        self.save_erroneous_geofences(std::slice::from_ref(geofence))
            .await
    }

    /// Load an erroneous geofence record, `None` if absent
    pub async fn get_erroneous_geofence(&self, id: &str) -> Result<Option<Geofence>> {
        self.load(&erroneous_key(id)).await
    }

    /// Delete an erroneous geofence record; missing records are fine
    pub async fn remove_erroneous_geofence(&self, id: &str) -> Result<()> {
        self.backend.delete(&erroneous_key(id)).await?;
        debug!(geofence_id = id, "Erroneous geofence removed from store");
        Ok(())
    }

    /// Scan the erroneous namespace, pruning expired records
    pub async fn scan_erroneous_geofences(&self) -> Result<NamespaceScan> {
        self.scan(ERRONEOUS_GEOFENCE_KEY_PREFIX).await
    }

    /// Non-expired erroneous geofences, pruning expired records
    pub async fn erroneous_geofences(&self) -> Result<Vec<Geofence>> {
        Ok(self.scan_erroneous_geofences().await?.active)
    }

    /// Ids present in the erroneous namespace, without decoding or pruning
    pub async fn erroneous_ids(&self) -> Result<Vec<String>> {
        self.ids(ERRONEOUS_GEOFENCE_KEY_PREFIX).await
    }

    // ---- singleton configuration ----

    /// Replace the webhook configuration
    pub async fn save_webhook_configuration(&self, config: &WebhookConfiguration) -> Result<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| Error::store_io(format!("Failed to serialize webhook: {}", e)))?;
        self.backend.put(WEBHOOK_CONFIG_KEY, &value).await?;
        debug!(url = %config.url, "Webhook configuration saved to store");
        Ok(())
    }

    /// Stored webhook configuration, `None` if never configured
    pub async fn webhook_configuration(&self) -> Result<Option<WebhookConfiguration>> {
        self.load_json(WEBHOOK_CONFIG_KEY).await
    }

    /// Whether a webhook is configured; any error counts as "no"
    pub async fn has_webhook_configuration(&self) -> bool {
        self.backend
            .exists(WEBHOOK_CONFIG_KEY)
            .await
            .unwrap_or(false)
    }

    /// Replace the notification configuration
    pub async fn save_notification_configuration(
        &self,
        config: &NotificationConfiguration,
    ) -> Result<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| Error::store_io(format!("Failed to serialize notification: {}", e)))?;
        self.backend.put(NOTIFICATION_CONFIG_KEY, &value).await?;
        debug!(title = %config.title, "Notification configuration saved to store");
        Ok(())
    }

    /// Stored notification configuration, `None` if never configured
    pub async fn notification_configuration(&self) -> Result<Option<NotificationConfiguration>> {
        self.load_json(NOTIFICATION_CONFIG_KEY).await
    }

    /// Whether a notification is configured; any error counts as "no"
    pub async fn has_notification_configuration(&self) -> bool {
        self.backend
            .exists(NOTIFICATION_CONFIG_KEY)
            .await
            .unwrap_or(false)
    }

    // ---- internals ----

    async fn load(&self, key: &str) -> Result<Option<Geofence>> {
        match self.backend.get(key).await {
            Ok(record) => Geofence::from_record(&record).map(Some),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn load_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await {
            Ok(value) => serde_json::from_str(&value)
                .map(Some)
                .map_err(|e| Error::decode(format!("Malformed record under {}: {}", key, e))),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ids(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .backend
            .enumerate(prefix)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix).map(str::to_string))
            .collect())
    }

    async fn scan(&self, prefix: &str) -> Result<NamespaceScan> {
        let mut scan = NamespaceScan::default();

        for key in self.backend.enumerate(prefix).await? {
            let record = match self.backend.get(&key).await {
                Ok(record) => record,
                // Deleted between enumerate and get by a concurrent scan
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            let geofence = match Geofence::from_record(&record) {
                Ok(geofence) => geofence,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed geofence record");
                    scan.malformed.push(key);
                    continue;
                }
            };

            if geofence.is_expired() {
                if let Err(e) = self.backend.delete(&key).await {
                    warn!(key = %key, error = %e, "Failed to prune expired geofence");
                }
                debug!(key = %key, "Pruned expired geofence");
                scan.expired.push(geofence.id().to_string());
            } else {
                scan.active.push(geofence);
            }
        }

        Ok(scan)
    }
}

fn geofence_key(id: &str) -> String {
    format!("{}{}", GEOFENCE_KEY_PREFIX, id)
}

fn erroneous_key(id: &str) -> String {
    format!("{}{}", ERRONEOUS_GEOFENCE_KEY_PREFIX, id)
}
