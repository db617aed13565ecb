// # Location Provider Trait
//
// Defines the interface to the external location-monitoring service that
// performs the actual geometric tracking of registered regions.
//
// ## Implementations
//
// Providers live outside this crate (platform geofencing APIs, simulators,
// test doubles). The core only submits requests and consumes completions.
//
// ## Usage
//
// ```rust,ignore
// use geofence_core::traits::{LocationProvider, RegistrationCompletion};
//
// let (completion, pending) = RegistrationCompletion::channel();
// provider.register_region(request, &target, completion);
// match pending.await {
//     Ok(Ok(())) => println!("monitoring"),
//     Ok(Err(cause)) => println!("rejected: {cause}"),
//     Err(_) => println!("provider dropped the completion"),
// }
// ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use tokio::sync::oneshot;

/// Bit set of region transitions a provider reports
///
/// Bit values follow the platform convention: ENTER = 1, EXIT = 2, DWELL = 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TransitionMask(u8);

impl TransitionMask {
    /// Device entered the region
    pub const ENTER: Self = Self(1);
    /// Device left the region
    pub const EXIT: Self = Self(2);
    /// Device stayed inside the region for the loitering delay
    pub const DWELL: Self = Self(4);

    /// Mask with no transitions
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TransitionMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TransitionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::ENTER) {
            names.push("ENTER");
        }
        if self.contains(Self::EXIT) {
            names.push("EXIT");
        }
        if self.contains(Self::DWELL) {
            names.push("DWELL");
        }
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Provider-facing registration request for a single circular region
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    /// Caller-supplied geofence id, used by the provider as its request id
    pub id: String,
    /// Region centre latitude in degrees
    pub latitude: f64,
    /// Region centre longitude in degrees
    pub longitude: f64,
    /// Region radius in meters
    pub radius_meters: f32,
    /// Remaining lifetime of the registration; `None` never expires
    pub expiration_millis: Option<u64>,
    /// Transitions the provider should report
    pub transitions: TransitionMask,
    /// Time the device must stay inside before DWELL fires
    pub loitering_delay_millis: u32,
    /// Best-effort notification latency hint
    pub notification_responsiveness_millis: u32,
    /// Transitions to fire immediately if the device already satisfies them
    pub initial_trigger: Option<TransitionMask>,
}

/// Stable per-device route that provider-fired transitions are delivered to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTarget(String);

impl DeliveryTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome a provider reports for one registration: `Err` carries the cause
pub type RegistrationOutcome = std::result::Result<(), String>;

/// Single-shot completion handle for one registration request
///
/// The handle is consumed by [`succeed`](Self::succeed) or
/// [`fail`](Self::fail), so a registration completes at most once. Dropping
/// the handle without completing it is reported to the waiter as a failure.
/// The handle is `Send` and may be completed from any provider thread.
#[derive(Debug)]
pub struct RegistrationCompletion {
    tx: oneshot::Sender<RegistrationOutcome>,
}

impl RegistrationCompletion {
    /// Create a completion handle and the receiver awaiting it
    pub fn channel() -> (Self, oneshot::Receiver<RegistrationOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report that the provider is now monitoring the region
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// Report that the provider rejected or failed the registration
    pub fn fail(self, cause: impl Into<String>) {
        self.complete(Err(cause.into()));
    }

    /// Report an outcome
    pub fn complete(self, outcome: RegistrationOutcome) {
        // The waiter may have timed out already
        if self.tx.send(outcome).is_err() {
            tracing::debug!("Registration completed after the waiter went away");
        }
    }
}

/// Trait for location-monitoring provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
/// Completions may be delivered from any thread.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Hand requests to the platform monitoring service
/// - ✅ Complete the registration handle from a platform callback thread
/// - ✅ Answer permission and service-availability queries
///
/// ## Forbidden Capabilities
/// - ❌ Retry failed registrations (owned by `RecoveryCoordinator`)
/// - ❌ Access the geofence store (owned by `GeofenceManager`)
/// - ❌ Decide whether a geofence is expired or erroneous
pub trait LocationProvider: Send + Sync {
    /// Submit a region for monitoring
    ///
    /// Must return promptly; the outcome is reported exactly once through
    /// `completion`. Re-registering an id that is already monitored must
    /// replace the previous registration.
    fn register_region(
        &self,
        request: RegistrationRequest,
        target: &DeliveryTarget,
        completion: RegistrationCompletion,
    );

    /// Stop monitoring the given ids
    ///
    /// Fire-and-forget: `Ok` only means the request was handed over.
    fn unregister_regions(&self, ids: &[String]) -> Result<(), crate::Error>;

    /// Whether fine location permission is granted
    fn has_permission(&self) -> bool;

    /// Whether location services are enabled on the device
    fn location_services_enabled(&self) -> bool;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_mask_bits() {
        let mask = TransitionMask::ENTER | TransitionMask::EXIT;
        assert_eq!(mask.bits(), 3);
        assert!(mask.contains(TransitionMask::ENTER));
        assert!(!mask.contains(TransitionMask::DWELL));
        assert_eq!((mask | TransitionMask::DWELL).bits(), 7);
        assert_eq!(mask.to_string(), "ENTER|EXIT");
        assert_eq!(TransitionMask::empty().to_string(), "NONE");
    }

    #[tokio::test]
    async fn test_completion_delivers_once() {
        let (completion, pending) = RegistrationCompletion::channel();
        std::thread::spawn(move || completion.fail("GEOFENCE_TOO_MANY_GEOFENCES"));

        let outcome = pending.await.unwrap();
        assert_eq!(outcome, Err("GEOFENCE_TOO_MANY_GEOFENCES".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_completion_is_observed() {
        let (completion, pending) = RegistrationCompletion::channel();
        drop(completion);
        assert!(pending.await.is_err());
    }
}
