//! Core traits for the geofencing system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`LocationProvider`]: Platform service that monitors registered regions
//! - [`KeyValueStore`]: Durable storage under the geofence store

pub mod kv_store;
pub mod location_provider;

pub use kv_store::KeyValueStore;
pub use location_provider::{
    DeliveryTarget, LocationProvider, RegistrationCompletion, RegistrationOutcome,
    RegistrationRequest, TransitionMask,
};
