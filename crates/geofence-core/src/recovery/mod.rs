//! Recovery coordinator
//!
//! Scans stored geofences, prunes expired ones and re-registers geofences
//! flagged erroneous. Expiry is enforced lazily whenever a namespace is
//! listed; the optional periodic sweep only makes that happen on a timer.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::RecoveryConfig;
use crate::error::{Error, Result};
use crate::geofence::Geofence;
use crate::lifecycle::{GeofenceEvent, GeofenceManager};
use crate::store::NamespaceScan;

/// Why a recovery pass did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PermissionDenied,
    LocationServicesDisabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PermissionDenied => write!(f, "permission denied"),
            SkipReason::LocationServicesDisabled => write!(f, "location services disabled"),
        }
    }
}

/// Outcome of a recovery pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Set when the pass was a silent no-op
    pub skipped: Option<SkipReason>,

    /// Ids registered again
    pub re_registered: Vec<String>,

    /// Ids whose registration failed, with the cause
    pub failed: Vec<(String, String)>,

    /// Ids pruned because they had expired
    pub expired: Vec<String>,

    /// Ids newly queued for re-registration
    pub marked_erroneous: Vec<String>,
}

impl RecoveryReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Restores provider registrations from the store
pub struct RecoveryCoordinator {
    manager: Arc<GeofenceManager>,
    sweep_interval: Option<Duration>,
}

impl RecoveryCoordinator {
    pub fn new(manager: Arc<GeofenceManager>, config: RecoveryConfig) -> Self {
        Self {
            manager,
            sweep_interval: config.sweep_interval(),
        }
    }

    pub fn manager(&self) -> &Arc<GeofenceManager> {
        &self.manager
    }

    /// Non-expired stored geofences; expired ones are deleted as a side effect
    pub async fn list_active(&self) -> Result<Vec<Geofence>> {
        let scan = self.manager.store().scan_geofences().await?;
        Ok(self.observe_scan(scan).active)
    }

    /// Non-expired erroneous geofences; expired ones are deleted as a side effect
    pub async fn list_erroneous(&self) -> Result<Vec<Geofence>> {
        let scan = self.manager.store().scan_erroneous_geofences().await?;
        Ok(self.observe_scan(scan).active)
    }

    /// Queue the stored geofence `id` for re-registration
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Copied into the erroneous namespace
    /// - `Err(Error::NotFound)`: No durable record for `id`
    pub async fn mark_erroneous(&self, id: &str) -> Result<()> {
        let geofence = self
            .manager
            .store()
            .get_geofence(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("No stored geofence with id {}", id)))?;

        self.mark_erroneous_geofence(&geofence).await
    }

    /// Queue one geofence for re-registration
    pub async fn mark_erroneous_geofence(&self, geofence: &Geofence) -> Result<()> {
        self.mark_erroneous_geofences(std::slice::from_ref(geofence))
            .await
    }

    /// Queue geofences for re-registration
    pub async fn mark_erroneous_geofences(&self, geofences: &[Geofence]) -> Result<()> {
        self.manager
            .store()
            .save_erroneous_geofences(geofences)
            .await?;

        for geofence in geofences {
            info!(geofence_id = geofence.id(), "Geofence marked erroneous");
            self.manager.emit_event(GeofenceEvent::MarkedErroneous {
                id: geofence.id().to_string(),
            });
        }
        Ok(())
    }

    /// Retry every non-expired erroneous geofence
    ///
    /// A silent no-op without permission or with location services off.
    /// Successes are persisted and cleared from the erroneous namespace;
    /// failures stay queued. Running it again after a full success does
    /// nothing.
    pub async fn re_register_erroneous_geofences(&self) -> Result<RecoveryReport> {
        if let Some(reason) = self.skip_reason() {
            debug!(reason = %reason, "Skipping re-registration of erroneous geofences");
            return Ok(RecoveryReport::skipped(reason));
        }

        let mut report = RecoveryReport::default();
        self.re_register_erroneous_into(&mut report, &HashSet::new())
            .await?;
        Ok(report)
    }

    /// Re-arm durable geofences after the provider lost its registrations
    ///
    /// Every active record in the geofence namespace is submitted again;
    /// failures are queued as erroneous. Geofences that were already
    /// erroneous are then retried.
    pub async fn handle_device_restart(&self) -> Result<RecoveryReport> {
        if let Some(reason) = self.skip_reason() {
            debug!(reason = %reason, "Skipping device restart recovery");
            return Ok(RecoveryReport::skipped(reason));
        }

        let mut report = RecoveryReport::default();
        let scan = self.manager.store().scan_geofences().await?;
        let scan = self.observe_scan(scan);
        report.expired.extend(scan.expired);

        let mut just_marked = HashSet::new();
        for geofence in scan.active {
            let _guard = self.manager.lock_id(geofence.id()).await;

            // Removed while we waited for the lock
            if self.manager.store().get_geofence(geofence.id()).await?.is_none() {
                continue;
            }

            match self.manager.register_locked(&geofence, true).await {
                // The existing record stays in place even if the rewrite failed
                Ok(_) => report.re_registered.push(geofence.id().to_string()),
                Err(e) => {
                    report.failed.push((geofence.id().to_string(), e.to_string()));
                    self.mark_erroneous_geofence(&geofence).await?;
                    report.marked_erroneous.push(geofence.id().to_string());
                    just_marked.insert(geofence.id().to_string());
                }
            }
        }

        self.re_register_erroneous_into(&mut report, &just_marked)
            .await?;

        info!(
            re_registered = report.re_registered.len(),
            marked_erroneous = report.marked_erroneous.len(),
            "Device restart recovery complete"
        );
        Ok(report)
    }

    /// Run the periodic sweep until `shutdown_rx` fires
    ///
    /// Each tick prunes expired geofences and retries erroneous ones. With
    /// the sweep disabled this only waits for shutdown.
    pub async fn run_with_shutdown(&self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        let Some(period) = self.sweep_interval else {
            debug!("Periodic sweep disabled");
            let _ = shutdown_rx.await;
            info!("Shutdown signal received, recovery stopped");
            return Ok(());
        };

        info!(interval_secs = period.as_secs(), "Periodic sweep started");
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }

                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received, recovery stopped");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn sweep(&self) {
        if let Err(e) = self.list_active().await {
            warn!(error = %e, "Sweep failed to prune geofences");
        }

        match self.re_register_erroneous_geofences().await {
            Ok(report) if !report.is_skipped() => {
                debug!(
                    re_registered = report.re_registered.len(),
                    failed = report.failed.len(),
                    "Sweep retried erroneous geofences"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Sweep failed to retry erroneous geofences"),
        }
    }

    async fn re_register_erroneous_into(
        &self,
        report: &mut RecoveryReport,
        skip: &HashSet<String>,
    ) -> Result<()> {
        let store = self.manager.store();
        let scan = store.scan_erroneous_geofences().await?;
        let scan = self.observe_scan(scan);
        report.expired.extend(scan.expired);

        for geofence in scan.active {
            let id = geofence.id().to_string();
            if skip.contains(&id) {
                continue;
            }

            let _guard = self.manager.lock_id(&id).await;

            // Cleared by a concurrent remove or recovery pass
            if store.get_erroneous_geofence(&id).await?.is_none() {
                continue;
            }

            match self.manager.register_locked(&geofence, true).await {
                Ok(false) => {
                    // The erroneous record is the only durable copy left
                    let error = "registered but the geofence record could not be saved";
                    warn!(geofence_id = %id, "Keeping erroneous geofence queued: {}", error);
                    self.manager.emit_event(GeofenceEvent::ReRegistrationFailed {
                        id: id.clone(),
                        error: error.to_string(),
                    });
                    report.failed.push((id, error.to_string()));
                }
                Ok(true) => {
                    if let Err(e) = store.remove_erroneous_geofence(&id).await {
                        warn!(geofence_id = %id, error = %e, "Failed to clear erroneous geofence");
                    }
                    info!(geofence_id = %id, "Erroneous geofence re-registered");
                    self.manager
                        .emit_event(GeofenceEvent::ReRegistered { id: id.clone() });
                    report.re_registered.push(id);
                }
                Err(e) => {
                    self.manager.emit_event(GeofenceEvent::ReRegistrationFailed {
                        id: id.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        Ok(())
    }

    fn observe_scan(&self, scan: NamespaceScan) -> NamespaceScan {
        for id in &scan.expired {
            info!(geofence_id = %id, "Expired geofence pruned");
            self.manager
                .emit_event(GeofenceEvent::Expired { id: id.clone() });
        }
        scan
    }

    fn skip_reason(&self) -> Option<SkipReason> {
        let provider = self.manager.provider();
        if !provider.has_permission() {
            Some(SkipReason::PermissionDenied)
        } else if !provider.location_services_enabled() {
            Some(SkipReason::LocationServicesDisabled)
        } else {
            None
        }
    }
}
