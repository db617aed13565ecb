//! Configuration types for the geofencing system
//!
//! This module defines all runtime configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::state::{FileKeyValueStore, MemoryKeyValueStore};
use crate::traits::{DeliveryTarget, KeyValueStore};

/// Main geofencing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeofencingConfig {
    /// Store backend configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Lifecycle manager settings
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Recovery coordinator settings
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl GeofencingConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.manager.validate()?;
        Ok(())
    }
}

/// Store backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
        }
    }

    /// Open the configured backend
    pub async fn open(&self) -> Result<Arc<dyn KeyValueStore>, crate::Error> {
        self.validate()?;
        match self {
            StoreConfig::File { path } => Ok(Arc::new(FileKeyValueStore::new(path).await?)),
            StoreConfig::Memory => Ok(Arc::new(MemoryKeyValueStore::new())),
        }
    }
}

/// Lifecycle manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// How long to wait for the provider to complete a registration (in seconds)
    ///
    /// A registration that is still pending when this elapses fails with
    /// `ProviderTimeout` and is not persisted.
    #[serde(default = "default_registration_timeout_secs")]
    pub registration_timeout_secs: u64,

    /// Capacity of the lifecycle event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Route that provider-fired transitions are delivered to
    #[serde(default = "default_delivery_target")]
    pub delivery_target: String,
}

impl ManagerConfig {
    /// Validate the manager configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.registration_timeout_secs == 0 {
            return Err(crate::Error::config("Registration timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.delivery_target.trim().is_empty() {
            return Err(crate::Error::config("Delivery target cannot be empty"));
        }
        Ok(())
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn delivery_target(&self) -> DeliveryTarget {
        DeliveryTarget::new(self.delivery_target.clone())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            registration_timeout_secs: default_registration_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            delivery_target: default_delivery_target(),
        }
    }
}

/// Recovery coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Interval of the optional background sweep (in seconds)
    ///
    /// Each sweep prunes expired geofences and retries erroneous ones.
    /// Set to 0 (the default) to rely on lazy pruning only.
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl RecoveryConfig {
    /// Sweep interval, or `None` when the sweep is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn default_registration_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_delivery_target() -> String {
    "geofence-transitions".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GeofencingConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.manager.registration_timeout(), Duration::from_secs(30));
        assert_eq!(config.recovery.sweep_interval(), None);
        assert_eq!(config.store.type_name(), "memory");
    }

    #[test]
    fn test_config_from_json() {
        let config: GeofencingConfig = serde_json::from_value(serde_json::json!({
            "store": { "type": "file", "path": "/tmp/geofences.json" },
            "manager": { "registration_timeout_secs": 5 },
            "recovery": { "sweep_interval_secs": 900 }
        }))
        .unwrap();

        assert_eq!(config.store.type_name(), "file");
        assert_eq!(config.manager.registration_timeout_secs, 5);
        assert_eq!(config.manager.event_channel_capacity, 256);
        assert_eq!(config.recovery.sweep_interval(), Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GeofencingConfig::new();
        config.manager.registration_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let config = GeofencingConfig {
            store: StoreConfig::File {
                path: " ".to_string(),
            },
            ..GeofencingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
