//! Geofence lifecycle manager
//!
//! The GeofenceManager is responsible for:
//! - Checking permission and location services before touching the provider
//! - Submitting registrations and awaiting their single-shot completion
//! - Persisting durable geofences after a confirmed registration
//! - Unregistering and deleting geofences on removal
//!
//! ## Architecture
//!
//! ```text
//!                  add / register / remove
//!                            │
//!                            ▼
//!                  ┌──────────────────┐
//!                  │ GeofenceManager  │
//!                  └──────────────────┘
//!                            │
//!        ┌───────────────────┼───────────────────┐
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌──────────────┐   ┌──────────────┐    ┌─────────────┐
//! │LocationProvider│ │GeofenceStore │    │   Events    │
//! │ (register)   │   │ (persist)    │    │  (notify)   │
//! └──────────────┘   └──────────────┘    └─────────────┘
//! ```
//!
//! ## Registration Flow
//!
//! 1. Permission, then location services
//! 2. Build the request with the manager's delivery target
//! 3. Await the completion (bounded by the registration timeout)
//! 4. On success, persist under `geo:` if requested
//! 5. On failure, report `Provider { id, cause }`; nothing is retried here
//!
//! Operations on the same id are serialized; different ids proceed
//! independently.

mod locks;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::geofence::{Geofence, GeofenceDefinition};
use crate::store::GeofenceStore;
use crate::traits::{DeliveryTarget, LocationProvider, RegistrationCompletion};

use locks::IdLocks;

/// Events emitted by the GeofenceManager and RecoveryCoordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeofenceEvent {
    /// Registration handed to the provider
    RegistrationSubmitted { id: String },

    /// Provider confirmed the registration
    Registered { id: String, persisted: bool },

    /// Provider rejected, dropped or timed out the registration
    RegistrationFailed { id: String, error: String },

    /// Geofence unregistered and deleted
    Removed { id: String },

    /// Expired record pruned during a scan
    Expired { id: String },

    /// Geofence queued for re-registration
    MarkedErroneous { id: String },

    /// Erroneous geofence registered again and cleared
    ReRegistered { id: String },

    /// Erroneous geofence still failing; left queued
    ReRegistrationFailed { id: String, error: String },
}

/// Orchestrates add/remove between the provider and the store
pub struct GeofenceManager {
    /// Location provider for monitoring regions
    provider: Arc<dyn LocationProvider>,

    /// Durable geofence records
    store: GeofenceStore,

    /// Route for provider-fired transitions
    delivery_target: DeliveryTarget,

    /// Bound on the wait for a registration completion
    registration_timeout: Duration,

    /// Same-id serialization
    locks: IdLocks,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<GeofenceEvent>,
}

impl GeofenceManager {
    /// Create a new manager
    ///
    /// # Returns
    ///
    /// A tuple of (manager, event_receiver) where event_receiver yields lifecycle events
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: GeofenceStore,
        config: ManagerConfig,
    ) -> Result<(Self, mpsc::Receiver<GeofenceEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let manager = Self {
            provider,
            store,
            delivery_target: config.delivery_target(),
            registration_timeout: config.registration_timeout(),
            locks: IdLocks::new(),
            event_tx: tx,
        };

        Ok((manager, rx))
    }

    /// Fail fast unless permission is granted and location services are on
    pub fn check_preconditions(&self) -> Result<()> {
        if !self.provider.has_permission() {
            return Err(Error::permission_denied(
                "Fine location permission has not been granted",
            ));
        }
        if !self.provider.location_services_enabled() {
            return Err(Error::location_services_disabled(
                "Location services are switched off",
            ));
        }
        Ok(())
    }

    /// Register a new geofence
    ///
    /// The geofence is persisted iff the definition asks to be re-registered
    /// on device restart.
    ///
    /// # Returns
    ///
    /// - `Ok(id)`: The provider is monitoring the region
    /// - `Err(Error::PermissionDenied | Error::LocationServicesDisabled)`: Nothing was submitted
    /// - `Err(Error::Validation)`: The definition was rejected
    /// - `Err(Error::Provider | Error::ProviderTimeout)`: The registration failed
    pub async fn add(&self, definition: GeofenceDefinition) -> Result<String> {
        self.check_preconditions()?;

        let geofence = Geofence::from_definition(definition)?;
        let persist = geofence.register_on_restart();

        let _guard = self.lock_id(geofence.id()).await;
        self.register_locked(&geofence, persist).await?;

        Ok(geofence.id().to_string())
    }

    /// Register an existing geofence with an explicit persist flag
    pub async fn register(&self, geofence: &Geofence, persist: bool) -> Result<()> {
        self.check_preconditions()?;

        let _guard = self.lock_id(geofence.id()).await;
        self.register_locked(geofence, persist).await?;
        Ok(())
    }

    /// Stop monitoring a geofence and delete its records
    ///
    /// The unregister call is fire-and-forget: its failure is logged and the
    /// records are deleted regardless. Any erroneous record for the id is
    /// cleared too, so a removed geofence is never re-registered.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.lock_id(id).await;

        if let Err(e) = self.provider.unregister_regions(&[id.to_string()]) {
            warn!(geofence_id = id, error = %e, "Provider failed to unregister geofence");
        }

        // Both deletes are attempted; the first failure is reported
        let removed = self.store.remove_geofence(id).await;
        let cleared = self.store.remove_erroneous_geofence(id).await;
        if let Err(e) = removed.and(cleared) {
            warn!(geofence_id = id, error = %e, "Failed to delete geofence records");
            return Err(e);
        }

        info!(geofence_id = id, "Geofence removed");
        self.emit_event(GeofenceEvent::Removed { id: id.to_string() });
        Ok(())
    }

    pub fn store(&self) -> &GeofenceStore {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn LocationProvider> {
        &self.provider
    }

    pub fn delivery_target(&self) -> &DeliveryTarget {
        &self.delivery_target
    }

    /// Hold exclusive access to `id` until the guard drops
    pub(crate) async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(id).await
    }

    /// Submit, await and persist one registration
    ///
    /// Caller must hold the id's lock. A failed `put` after a confirmed
    /// registration is logged and does not fail the call; the returned flag
    /// says whether the geofence record was written.
    pub(crate) async fn register_locked(&self, geofence: &Geofence, persist: bool) -> Result<bool> {
        let id = geofence.id();

        let (completion, pending) = RegistrationCompletion::channel();
        debug!(
            geofence_id = id,
            provider = self.provider.provider_name(),
            transitions = %geofence.transitions(),
            "Submitting geofence registration"
        );
        self.provider
            .register_region(geofence.registration_request(), &self.delivery_target, completion);
        self.emit_event(GeofenceEvent::RegistrationSubmitted { id: id.to_string() });

        let outcome = match tokio::time::timeout(self.registration_timeout, pending).await {
            Err(_) => Err(Error::provider_timeout(id, self.registration_timeout)),
            Ok(Err(_)) => Err(Error::provider(
                id,
                "provider dropped the registration without completing it",
            )),
            Ok(Ok(Err(cause))) => Err(Error::provider(id, cause)),
            Ok(Ok(Ok(()))) => Ok(()),
        };

        if let Err(e) = outcome {
            warn!(geofence_id = id, error = %e, "Geofence registration failed");
            self.emit_event(GeofenceEvent::RegistrationFailed {
                id: id.to_string(),
                error: e.to_string(),
            });
            return Err(e);
        }

        let persisted = if persist {
            match self.store.save_geofence(geofence).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(geofence_id = id, error = %e, "Failed to persist registered geofence");
                    false
                }
            }
        } else {
            false
        };

        info!(geofence_id = id, persisted, "Geofence registered");
        self.emit_event(GeofenceEvent::Registered {
            id: id.to_string(),
            persisted,
        });
        Ok(persisted)
    }

    /// Emit a lifecycle event, dropping it if the channel is full
    pub(crate) fn emit_event(&self, event: GeofenceEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
