// # geofence-core
//
// Core library for background geofencing.
//
// ## Architecture Overview
//
// This library keeps a set of monitored circular regions registered with an
// external location provider, durably, across failures and restarts:
// - **LocationProvider**: Trait for the external region-monitoring service
// - **KeyValueStore**: Trait for the durability layer (file or in-memory)
// - **GeofenceStore**: Namespaced geofence and configuration records
// - **Geofence**: Validated, immutable region definition
// - **GeofenceManager**: Orchestrates add/remove against provider and store
// - **RecoveryCoordinator**: Prunes expired geofences and re-registers erroneous ones
// - **Geofencing**: Caller-facing facade over all of the above
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Provider and storage are traits; the core never
//    talks to a platform API directly
// 2. **Exactly-once completion**: Each registration is answered through a
//    single-shot handle
// 3. **Lazy expiry**: Expired geofences are deleted when a namespace is listed
// 4. **Library-First**: All functionality can be embedded; the CLI is a thin shell

pub mod config;
pub mod delivery;
pub mod error;
pub mod geofence;
pub mod geofencing;
pub mod lifecycle;
pub mod recovery;
pub mod state;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{GeofencingConfig, ManagerConfig, RecoveryConfig, StoreConfig};
pub use delivery::{Configuration, NotificationConfiguration, WebhookConfiguration};
pub use error::{Error, Result};
pub use geofence::{Geofence, GeofenceDefinition, NEVER_EXPIRE};
pub use geofencing::Geofencing;
pub use lifecycle::{GeofenceEvent, GeofenceManager};
pub use recovery::{RecoveryCoordinator, RecoveryReport, SkipReason};
pub use state::{FileKeyValueStore, MemoryKeyValueStore};
pub use store::{GeofenceStore, NamespaceScan};
pub use traits::{KeyValueStore, LocationProvider};
