//! Geofence entity
//!
//! A [`Geofence`] is the validated, immutable definition of one monitored
//! circular region. It is built from one of two shapes:
//!
//! - **fresh**: a [`GeofenceDefinition`] supplied by the caller, carrying a
//!   relative `expiration`; the absolute expiration date is fixed at
//!   construction time
//! - **durable**: a persisted record carrying the absolute `expirationDate`,
//!   used when rehydrating from the store
//!
//! ## Record Format
//!
//! ```json
//! {
//!   "id": "home",
//!   "lat": 37.0,
//!   "lng": -122.0,
//!   "radius": 100.0,
//!   "expiration": -1,
//!   "expirationDate": -1,
//!   "notificationResponsiveness": 0,
//!   "loiteringDelay": 0,
//!   "dwellTransitionType": 0,
//!   "registerOnDeviceRestart": true,
//!   "setInitialTriggers": false
//! }
//! ```
//!
//! `-1` is the "never" sentinel for both expiration fields.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::{RegistrationRequest, TransitionMask};

/// Sentinel stored for "never expires"
pub const NEVER_EXPIRE: i64 = -1;

/// Caller input for a new geofence (the "fresh" shape)
///
/// Deserializes from the host's camelCase map. `id`, `lat`, `lng` and
/// `radius` are required; every other field defaults to zero/false, and an
/// `expiration` of zero or less means the geofence never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceDefinition {
    /// Caller-supplied unique id
    pub id: String,

    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lng: f64,

    /// Radius in meters
    pub radius: f64,

    /// Lifetime in milliseconds from now
    #[serde(default)]
    pub expiration: i64,

    /// Notification responsiveness hint in milliseconds
    #[serde(default)]
    pub notification_responsiveness: i64,

    /// Loitering delay before DWELL fires, in milliseconds
    #[serde(default)]
    pub loitering_delay: i64,

    /// Also report DWELL transitions
    #[serde(default)]
    pub set_dwell_transition_type: bool,

    /// Persist so the geofence can be re-armed after a device restart
    #[serde(default)]
    pub register_on_device_restart: bool,

    /// Fire immediately if the device already satisfies the region
    #[serde(default)]
    pub set_initial_triggers: bool,
}

impl GeofenceDefinition {
    /// Create a definition with the required fields and defaults elsewhere
    pub fn new(id: impl Into<String>, lat: f64, lng: f64, radius: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            radius,
            expiration: 0,
            notification_responsiveness: 0,
            loitering_delay: 0,
            set_dwell_transition_type: false,
            register_on_device_restart: false,
            set_initial_triggers: false,
        }
    }

    /// Parse a definition from the host's JSON map
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("Invalid geofence definition: {}", e)))
    }

    /// Set the lifetime
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Enable DWELL with the given loitering delay
    pub fn with_dwell(mut self, loitering_delay: Duration) -> Self {
        self.set_dwell_transition_type = true;
        self.loitering_delay = i64::try_from(loitering_delay.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Set the notification responsiveness hint
    pub fn with_notification_responsiveness(mut self, responsiveness: Duration) -> Self {
        self.notification_responsiveness =
            i64::try_from(responsiveness.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Persist the geofence so it is re-armed after a device restart
    pub fn with_register_on_device_restart(mut self, enabled: bool) -> Self {
        self.register_on_device_restart = enabled;
        self
    }

    /// Fire immediately if the device already satisfies the region
    pub fn with_initial_triggers(mut self, enabled: bool) -> Self {
        self.set_initial_triggers = enabled;
        self
    }
}

/// Persisted shape of a geofence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeofenceRecord {
    id: String,
    lat: f64,
    lng: f64,
    radius: f32,
    expiration: i64,
    expiration_date: i64,
    notification_responsiveness: i64,
    loitering_delay: i64,
    dwell_transition_type: i64,
    register_on_device_restart: bool,
    set_initial_triggers: bool,
}

/// One monitored circular region
///
/// Immutable after construction; changes are made by replacing or deleting
/// the stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    id: String,
    lat: f64,
    lng: f64,
    radius: f32,
    expiration_millis: Option<u64>,
    expiration_date_millis: Option<i64>,
    notification_responsiveness_millis: u32,
    loitering_delay_millis: u32,
    dwell_enabled: bool,
    register_on_restart: bool,
    set_initial_triggers: bool,
}

impl Geofence {
    /// Build from caller input, fixing the expiration date relative to now
    pub fn from_definition(definition: GeofenceDefinition) -> Result<Self> {
        Self::from_definition_at(definition, Utc::now())
    }

    /// Build from caller input with an explicit creation instant
    pub fn from_definition_at(definition: GeofenceDefinition, now: DateTime<Utc>) -> Result<Self> {
        validate_id(&definition.id)?;
        validate_position(definition.lat, definition.lng)?;
        let radius = validate_radius(definition.radius)?;

        let expiration_millis = u64::try_from(definition.expiration)
            .ok()
            .filter(|millis| *millis > 0);
        let expiration_date_millis = match expiration_millis {
            Some(_) => Some(now.timestamp_millis().saturating_add(definition.expiration)),
            None => None,
        };

        Ok(Self {
            id: definition.id,
            lat: definition.lat,
            lng: definition.lng,
            radius,
            expiration_millis,
            expiration_date_millis,
            notification_responsiveness_millis: validate_millis(
                "notificationResponsiveness",
                definition.notification_responsiveness,
            )?,
            loitering_delay_millis: validate_millis("loiteringDelay", definition.loitering_delay)?,
            dwell_enabled: definition.set_dwell_transition_type,
            register_on_restart: definition.register_on_device_restart,
            set_initial_triggers: definition.set_initial_triggers,
        })
    }

    /// Rehydrate from a persisted record (the "durable" shape)
    pub fn from_record(record: &str) -> Result<Self> {
        let record: GeofenceRecord = serde_json::from_str(record)
            .map_err(|e| Error::decode(format!("Malformed geofence record: {}", e)))?;

        let decode = |e: Error| Error::decode(format!("Invalid geofence record: {}", e));
        validate_id(&record.id).map_err(decode)?;
        validate_position(record.lat, record.lng).map_err(decode)?;
        let radius = validate_radius(f64::from(record.radius)).map_err(decode)?;

        let dwell_enabled = match record.dwell_transition_type {
            0 => false,
            bits if bits == i64::from(TransitionMask::DWELL.bits()) => true,
            other => {
                return Err(Error::decode(format!(
                    "Invalid dwellTransitionType {} for geofence {}",
                    other, record.id
                )));
            }
        };

        Ok(Self {
            lat: record.lat,
            lng: record.lng,
            radius,
            expiration_millis: u64::try_from(record.expiration)
                .ok()
                .filter(|millis| *millis > 0),
            expiration_date_millis: Some(record.expiration_date).filter(|date| *date > 0),
            notification_responsiveness_millis: validate_millis(
                "notificationResponsiveness",
                record.notification_responsiveness,
            )
            .map_err(decode)?,
            loitering_delay_millis: validate_millis("loiteringDelay", record.loitering_delay)
                .map_err(decode)?,
            dwell_enabled,
            register_on_restart: record.register_on_device_restart,
            set_initial_triggers: record.set_initial_triggers,
            id: record.id,
        })
    }

    /// Serialize to the persisted record format
    pub fn to_record(&self) -> Result<String> {
        let record = GeofenceRecord {
            id: self.id.clone(),
            lat: self.lat,
            lng: self.lng,
            radius: self.radius,
            expiration: self
                .expiration_millis
                .and_then(|millis| i64::try_from(millis).ok())
                .unwrap_or(NEVER_EXPIRE),
            expiration_date: self.expiration_date_millis.unwrap_or(NEVER_EXPIRE),
            notification_responsiveness: i64::from(self.notification_responsiveness_millis),
            loitering_delay: i64::from(self.loitering_delay_millis),
            dwell_transition_type: if self.dwell_enabled {
                i64::from(TransitionMask::DWELL.bits())
            } else {
                0
            },
            register_on_device_restart: self.register_on_restart,
            set_initial_triggers: self.set_initial_triggers,
        };

        serde_json::to_string(&record)
            .map_err(|e| Error::store_io(format!("Failed to serialize geofence {}: {}", self.id, e)))
    }

    /// Whether the geofence has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the geofence had expired at `now`
    ///
    /// A geofence that never expires is never expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiration_date_millis {
            Some(date) => now.timestamp_millis() > date,
            None => false,
        }
    }

    /// Transitions the provider should report
    pub fn transitions(&self) -> TransitionMask {
        let base = TransitionMask::ENTER | TransitionMask::EXIT;
        if self.dwell_enabled {
            base | TransitionMask::DWELL
        } else {
            base
        }
    }

    /// Build the provider request as of now
    pub fn registration_request(&self) -> RegistrationRequest {
        self.registration_request_at(Utc::now())
    }

    /// Build the provider request as of `now`
    ///
    /// The provider is given the time remaining until the fixed expiration
    /// date, so re-registering after a restart never extends a lifetime.
    pub fn registration_request_at(&self, now: DateTime<Utc>) -> RegistrationRequest {
        let expiration_millis = self.expiration_date_millis.map(|date| {
            u64::try_from(date.saturating_sub(now.timestamp_millis())).unwrap_or(0)
        });

        RegistrationRequest {
            id: self.id.clone(),
            latitude: self.lat,
            longitude: self.lng,
            radius_meters: self.radius,
            expiration_millis,
            transitions: self.transitions(),
            loitering_delay_millis: self.loitering_delay_millis,
            notification_responsiveness_millis: self.notification_responsiveness_millis,
            initial_trigger: self.set_initial_triggers.then(|| self.transitions()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Lifetime requested at creation; `None` never expires
    pub fn expiration(&self) -> Option<Duration> {
        self.expiration_millis.map(Duration::from_millis)
    }

    /// Absolute expiration instant; `None` never expires
    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.expiration_date_millis
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }

    pub fn notification_responsiveness(&self) -> Duration {
        Duration::from_millis(u64::from(self.notification_responsiveness_millis))
    }

    pub fn loitering_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.loitering_delay_millis))
    }

    pub fn dwell_enabled(&self) -> bool {
        self.dwell_enabled
    }

    /// Whether the geofence is persisted and re-armed after a restart
    pub fn register_on_restart(&self) -> bool {
        self.register_on_restart
    }

    pub fn set_initial_triggers(&self) -> bool {
        self.set_initial_triggers
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::validation("Geofence id cannot be empty"));
    }
    Ok(())
}

fn validate_position(lat: f64, lng: f64) -> Result<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(Error::validation(format!(
            "Latitude must be between -90 and 90. Got: {}",
            lat
        )));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(Error::validation(format!(
            "Longitude must be between -180 and 180. Got: {}",
            lng
        )));
    }
    Ok(())
}

fn validate_radius(radius: f64) -> Result<f32> {
    // Narrowing to the provider's f32 radius
    let radius = radius as f32;
    if !radius.is_finite() || radius <= 0.0 {
        return Err(Error::validation(format!(
            "Radius must be a positive number of meters. Got: {}",
            radius
        )));
    }
    Ok(radius)
}

fn validate_millis(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::validation(format!(
            "{} must be between 0 and {} milliseconds. Got: {}",
            field,
            u32::MAX,
            value
        ))
    })
}
