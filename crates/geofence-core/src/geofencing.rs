//! Caller-facing geofencing API
//!
//! [`Geofencing`] bundles the lifecycle manager, the recovery coordinator
//! and the delivery configuration records behind the operations a host
//! bridge exposes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geofence_core::{Geofencing, GeofencingConfig, GeofenceDefinition};
//!
//! let (geofencing, events) = Geofencing::open(provider, GeofencingConfig::default()).await?;
//! let id = geofencing
//!     .add(GeofenceDefinition::new("home", 37.0, -122.0, 100.0))
//!     .await?;
//! geofencing.remove(&id).await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GeofencingConfig;
use crate::delivery::{Configuration, NotificationConfiguration, WebhookConfiguration};
use crate::error::Result;
use crate::geofence::GeofenceDefinition;
use crate::lifecycle::{GeofenceEvent, GeofenceManager};
use crate::recovery::{RecoveryCoordinator, RecoveryReport};
use crate::store::GeofenceStore;
use crate::traits::LocationProvider;

/// Geofencing service handle
#[derive(Clone)]
pub struct Geofencing {
    manager: Arc<GeofenceManager>,
    recovery: Arc<RecoveryCoordinator>,
}

impl Geofencing {
    /// Assemble the service over an already opened store
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: GeofenceStore,
        config: GeofencingConfig,
    ) -> Result<(Self, mpsc::Receiver<GeofenceEvent>)> {
        config.validate()?;

        let (manager, events) = GeofenceManager::new(provider, store, config.manager)?;
        let manager = Arc::new(manager);
        let recovery = Arc::new(RecoveryCoordinator::new(
            Arc::clone(&manager),
            config.recovery,
        ));

        Ok((Self { manager, recovery }, events))
    }

    /// Open the configured store backend and assemble the service
    pub async fn open(
        provider: Arc<dyn LocationProvider>,
        config: GeofencingConfig,
    ) -> Result<(Self, mpsc::Receiver<GeofenceEvent>)> {
        config.validate()?;
        info!(store = config.store.type_name(), "Opening geofence store");

        let backend = config.store.open().await?;
        Self::new(provider, GeofenceStore::new(backend), config)
    }

    /// Register a geofence; resolves with its id
    pub async fn add(&self, definition: GeofenceDefinition) -> Result<String> {
        self.manager.add(definition).await
    }

    /// Unregister a geofence and delete its records
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.manager.remove(id).await
    }

    /// Validate and replace the webhook configuration
    pub async fn configure_webhook(&self, config: WebhookConfiguration) -> Result<()> {
        config.validate()?;
        self.manager
            .store()
            .save_webhook_configuration(&config)
            .await
    }

    /// Replace the notification configuration
    pub async fn configure_notification(&self, config: NotificationConfiguration) -> Result<()> {
        self.manager
            .store()
            .save_notification_configuration(&config)
            .await
    }

    /// Store the notification (or its defaults) and the webhook, if given
    ///
    /// The whole configuration is validated before anything is written.
    pub async fn configure(&self, config: Configuration) -> Result<()> {
        config.validate()?;

        self.configure_notification(config.notification.unwrap_or_default())
            .await?;
        if let Some(webhook) = config.webhook {
            self.configure_webhook(webhook).await?;
        }
        Ok(())
    }

    pub fn has_permission(&self) -> bool {
        self.manager.provider().has_permission()
    }

    pub fn is_location_services_enabled(&self) -> bool {
        self.manager.provider().location_services_enabled()
    }

    /// Retry erroneous geofences in the background
    ///
    /// Fire-and-forget: failures are logged. The handle may be awaited to
    /// observe the outcome.
    pub fn re_register_erroneous(&self) -> JoinHandle<Option<RecoveryReport>> {
        let recovery = Arc::clone(&self.recovery);
        tokio::spawn(async move {
            match recovery.re_register_erroneous_geofences().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Re-registration of erroneous geofences failed");
                    None
                }
            }
        })
    }

    pub fn manager(&self) -> &Arc<GeofenceManager> {
        &self.manager
    }

    pub fn recovery(&self) -> &Arc<RecoveryCoordinator> {
        &self.recovery
    }

    pub fn store(&self) -> &GeofenceStore {
        self.manager.store()
    }
}
