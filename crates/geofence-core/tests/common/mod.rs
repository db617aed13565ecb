//! Test doubles and common utilities for geofencing contract tests
//!
//! The mock provider completes registrations according to a configurable
//! behavior and counts every call, so tests can assert on what reached the
//! provider without a real location service.

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use geofence_core::error::{Error, Result};
use geofence_core::traits::{
    DeliveryTarget, LocationProvider, RegistrationCompletion, RegistrationRequest,
};
use geofence_core::{
    Geofence, GeofenceDefinition, GeofenceEvent, GeofenceStore, Geofencing, GeofencingConfig,
    KeyValueStore, MemoryKeyValueStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How the mock answers a registration
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Complete successfully on the calling thread
    Succeed,
    /// Complete successfully from a separate OS thread
    SucceedOnThread,
    /// Complete with the given failure cause
    Fail(String),
    /// Keep the completion without ever answering
    Hang,
    /// Drop the completion without answering
    Drop,
}

/// A mock LocationProvider that tracks calls
#[derive(Clone)]
pub struct MockLocationProvider {
    default_behavior: Arc<Mutex<Behavior>>,
    per_id: Arc<Mutex<HashMap<String, Behavior>>>,
    permission: Arc<AtomicBool>,
    services_enabled: Arc<AtomicBool>,
    unregister_fails: Arc<AtomicBool>,
    register_call_count: Arc<AtomicUsize>,
    unregister_call_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RegistrationRequest>>>,
    targets: Arc<Mutex<Vec<String>>>,
    unregistered: Arc<Mutex<Vec<String>>>,
    held: Arc<Mutex<Vec<RegistrationCompletion>>>,
}

impl MockLocationProvider {
    pub fn new() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            default_behavior: Arc::new(Mutex::new(behavior)),
            per_id: Arc::new(Mutex::new(HashMap::new())),
            permission: Arc::new(AtomicBool::new(true)),
            services_enabled: Arc::new(AtomicBool::new(true)),
            unregister_fails: Arc::new(AtomicBool::new(false)),
            register_call_count: Arc::new(AtomicUsize::new(0)),
            unregister_call_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            targets: Arc::new(Mutex::new(Vec::new())),
            unregistered: Arc::new(Mutex::new(Vec::new())),
            held: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Change how every id without an override is answered
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.default_behavior.lock().unwrap() = behavior;
    }

    /// Override the answer for one id
    pub fn set_behavior_for(&self, id: &str, behavior: Behavior) {
        self.per_id
            .lock()
            .unwrap()
            .insert(id.to_string(), behavior);
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn set_services_enabled(&self, enabled: bool) {
        self.services_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_unregister_fails(&self, fails: bool) {
        self.unregister_fails.store(fails, Ordering::SeqCst);
    }

    /// Get the number of times register_region() was called
    pub fn register_call_count(&self) -> usize {
        self.register_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times unregister_regions() was called
    pub fn unregister_call_count(&self) -> usize {
        self.unregister_call_count.load(Ordering::SeqCst)
    }

    /// Requests received, in order
    pub fn requests(&self) -> Vec<RegistrationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Ids of requests received, in order
    pub fn registered_ids(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.id).collect()
    }

    /// Delivery targets received, in order
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }

    /// Ids passed to unregister_regions(), in order
    pub fn unregistered_ids(&self) -> Vec<String> {
        self.unregistered.lock().unwrap().clone()
    }

    fn behavior_for(&self, id: &str) -> Behavior {
        if let Some(behavior) = self.per_id.lock().unwrap().get(id) {
            return behavior.clone();
        }
        self.default_behavior.lock().unwrap().clone()
    }
}

impl LocationProvider for MockLocationProvider {
    fn register_region(
        &self,
        request: RegistrationRequest,
        target: &DeliveryTarget,
        completion: RegistrationCompletion,
    ) {
        self.register_call_count.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior_for(&request.id);
        self.requests.lock().unwrap().push(request);
        self.targets.lock().unwrap().push(target.to_string());

        match behavior {
            Behavior::Succeed => completion.succeed(),
            Behavior::SucceedOnThread => {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(10));
                    completion.succeed();
                });
            }
            Behavior::Fail(cause) => completion.fail(cause),
            Behavior::Hang => self.held.lock().unwrap().push(completion),
            Behavior::Drop => drop(completion),
        }
    }

    fn unregister_regions(&self, ids: &[String]) -> Result<()> {
        self.unregister_call_count.fetch_add(1, Ordering::SeqCst);
        self.unregistered.lock().unwrap().extend_from_slice(ids);

        if self.unregister_fails.load(Ordering::SeqCst) {
            return Err(Error::provider(ids.join(","), "GEOFENCE_NOT_AVAILABLE"));
        }
        Ok(())
    }

    fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn location_services_enabled(&self) -> bool {
        self.services_enabled.load(Ordering::SeqCst)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A KeyValueStore whose every operation fails
///
/// Counts put() calls so tests can prove a write was attempted.
#[derive(Clone, Default)]
pub struct FailingKeyValueStore {
    put_call_count: Arc<AtomicUsize>,
}

impl FailingKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of times put() was called
    pub fn put_call_count(&self) -> usize {
        self.put_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn put(&self, key: &str, _value: &str) -> Result<()> {
        self.put_call_count.fetch_add(1, Ordering::SeqCst);
        Err(Error::store_io(format!("disk full writing {}", key)))
    }

    async fn get(&self, key: &str) -> Result<String> {
        Err(Error::store_io(format!("unreadable {}", key)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Err(Error::store_io(format!("unreadable {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Err(Error::store_io(format!("read-only {}", key)))
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>> {
        Err(Error::store_io(format!("unreadable {}", prefix)))
    }
}

/// A KeyValueStore that rejects writes under one key prefix
///
/// Everything else is served by the wrapped in-memory store.
#[derive(Clone)]
pub struct PrefixFailingKeyValueStore {
    inner: MemoryKeyValueStore,
    failing_put_prefix: Option<String>,
    failing_delete_prefix: Option<String>,
}

impl PrefixFailingKeyValueStore {
    /// Fail every put whose key starts with `prefix`
    pub fn failing_puts(prefix: &str) -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            failing_put_prefix: Some(prefix.to_string()),
            failing_delete_prefix: None,
        }
    }

    /// Fail every delete whose key starts with `prefix`
    pub fn failing_deletes(prefix: &str) -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            failing_put_prefix: None,
            failing_delete_prefix: Some(prefix.to_string()),
        }
    }

    pub fn inner(&self) -> &MemoryKeyValueStore {
        &self.inner
    }

    fn rejects(prefix: &Option<String>, key: &str) -> bool {
        prefix.as_deref().is_some_and(|p| key.starts_with(p))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for PrefixFailingKeyValueStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        if Self::rejects(&self.failing_put_prefix, key) {
            return Err(Error::store_io(format!("disk full writing {}", key)));
        }
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<String> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if Self::rejects(&self.failing_delete_prefix, key) {
            return Err(Error::store_io(format!("read-only {}", key)));
        }
        self.inner.delete(key).await
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.enumerate(prefix).await
    }
}

/// A geofencing service over a store that rejects some writes
///
/// Returns the wrapped in-memory store so tests can inspect raw keys.
pub fn prefix_failing_geofencing(
    provider: &MockLocationProvider,
    backend: PrefixFailingKeyValueStore,
) -> (Geofencing, mpsc::Receiver<GeofenceEvent>, MemoryKeyValueStore) {
    let store = GeofenceStore::new(Arc::new(backend.clone()));
    let (geofencing, events) = Geofencing::new(
        Arc::new(provider.clone()),
        store,
        GeofencingConfig::default(),
    )
    .expect("geofencing construction succeeds");
    (geofencing, events, backend.inner().clone())
}

/// A geofencing service over a store that always fails
pub fn failing_geofencing(
    provider: &MockLocationProvider,
) -> (Geofencing, mpsc::Receiver<GeofenceEvent>, FailingKeyValueStore) {
    let backend = FailingKeyValueStore::new();
    let store = GeofenceStore::new(Arc::new(backend.clone()));
    let (geofencing, events) = Geofencing::new(
        Arc::new(provider.clone()),
        store,
        GeofencingConfig::default(),
    )
    .expect("geofencing construction succeeds");
    (geofencing, events, backend)
}

/// A geofencing service over an in-memory store
///
/// Returns the backend so tests can inspect raw keys.
pub fn memory_geofencing(
    provider: &MockLocationProvider,
) -> (Geofencing, mpsc::Receiver<GeofenceEvent>, MemoryKeyValueStore) {
    memory_geofencing_with(provider, GeofencingConfig::default())
}

pub fn memory_geofencing_with(
    provider: &MockLocationProvider,
    config: GeofencingConfig,
) -> (Geofencing, mpsc::Receiver<GeofenceEvent>, MemoryKeyValueStore) {
    let backend = MemoryKeyValueStore::new();
    let store = GeofenceStore::new(Arc::new(backend.clone()));
    let (geofencing, events) = Geofencing::new(Arc::new(provider.clone()), store, config)
        .expect("geofencing construction succeeds");
    (geofencing, events, backend)
}

/// Config with the shortest registration timeout
pub fn fast_timeout_config() -> GeofencingConfig {
    let mut config = GeofencingConfig::default();
    config.manager.registration_timeout_secs = 1;
    config
}

/// Durable, never-expiring definition
pub fn durable(id: &str) -> GeofenceDefinition {
    GeofenceDefinition::new(id, 37.0, -122.0, 100.0).with_register_on_device_restart(true)
}

/// Geofence whose expiration date is an hour in the past
pub fn expired_geofence(id: &str) -> Geofence {
    Geofence::from_definition_at(
        durable(id).with_expiration(Duration::from_secs(60)),
        Utc::now() - ChronoDuration::hours(1),
    )
    .expect("valid definition")
}

/// Drain every event currently queued
pub fn drain_events(events: &mut mpsc::Receiver<GeofenceEvent>) -> Vec<GeofenceEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Sorted ids of a geofence list
pub fn ids(geofences: &[Geofence]) -> Vec<String> {
    let mut ids: Vec<String> = geofences.iter().map(|g| g.id().to_string()).collect();
    ids.sort();
    ids
}
