//! Minimal embedding example for geofence-core
//!
//! This example demonstrates using geofence-core as a library with a custom
//! location provider. The provider answers registrations from its own OS
//! thread, the way a platform callback would.

use geofence_core::traits::{
    DeliveryTarget, LocationProvider, RegistrationCompletion, RegistrationRequest,
};
use geofence_core::{
    Configuration, GeofenceDefinition, Geofencing, GeofencingConfig, Result, WebhookConfiguration,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Level;

/// Simulated platform service with a small region limit
struct SimulatedProvider {
    monitored: Arc<Mutex<HashSet<String>>>,
    max_regions: usize,
}

impl SimulatedProvider {
    fn new(max_regions: usize) -> Self {
        Self {
            monitored: Arc::new(Mutex::new(HashSet::new())),
            max_regions,
        }
    }
}

impl LocationProvider for SimulatedProvider {
    fn register_region(
        &self,
        request: RegistrationRequest,
        target: &DeliveryTarget,
        completion: RegistrationCompletion,
    ) {
        println!(
            "[Provider] register {} ({}m, {}) -> {}",
            request.id, request.radius_meters, request.transitions, target
        );

        let monitored = Arc::clone(&self.monitored);
        let max_regions = self.max_regions;
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let mut monitored = match monitored.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if monitored.contains(&request.id) || monitored.len() < max_regions {
                monitored.insert(request.id);
                completion.succeed();
            } else {
                completion.fail("GEOFENCE_TOO_MANY_GEOFENCES");
            }
        });
    }

    fn unregister_regions(&self, ids: &[String]) -> Result<()> {
        let mut monitored = match self.monitored.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for id in ids {
            monitored.remove(id);
            println!("[Provider] unregister {}", id);
        }
        Ok(())
    }

    fn has_permission(&self) -> bool {
        true
    }

    fn location_services_enabled(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        "simulated"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    println!("=== Embedded geofence-core Example ===\n");

    let provider = Arc::new(SimulatedProvider::new(2));

    println!("1. Opening in-memory geofencing service...");
    let (geofencing, events) = Geofencing::open(provider, GeofencingConfig::default()).await?;

    let event_listener = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            println!("[Event] {:?}", event);
        }
    });

    println!("2. Configuring delivery...");
    geofencing
        .configure(Configuration {
            notification: None,
            webhook: Some(
                WebhookConfiguration::new("https://example.com/geofence")
                    .with_header("Authorization", "Bearer demo"),
            ),
        })
        .await?;

    println!("3. Adding geofences...");
    for (id, lat, lng) in [("home", 37.77, -122.41), ("work", 37.79, -122.40), ("gym", 37.76, -122.43)] {
        let definition = GeofenceDefinition::new(id, lat, lng, 150.0)
            .with_dwell(Duration::from_secs(60))
            .with_register_on_device_restart(true);
        match geofencing.add(definition).await {
            Ok(id) => println!("   added {}", id),
            Err(e) => println!("   {} failed [{}]: {}", id, e.code(), e),
        }
    }

    println!("4. Queueing the failed geofence for retry...");
    let gym = geofence_core::Geofence::from_definition(
        GeofenceDefinition::new("gym", 37.76, -122.43, 150.0).with_register_on_device_restart(true),
    )?;
    geofencing.recovery().mark_erroneous_geofence(&gym).await?;

    println!("5. Freeing a slot and retrying in the background...");
    geofencing.remove("work").await?;
    if let Ok(Some(report)) = geofencing.re_register_erroneous().await {
        println!("   re-registered: {:?}", report.re_registered);
    }

    let active = geofencing.recovery().list_active().await?;
    let mut ids: Vec<&str> = active.iter().map(|g| g.id()).collect();
    ids.sort();
    println!("6. Active geofences: {:?}", ids);

    drop(geofencing);
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
