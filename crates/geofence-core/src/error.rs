//! Error types for the geofencing system
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for geofencing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the geofencing system
#[derive(Error, Debug)]
pub enum Error {
    /// Fine location permission has not been granted
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Location services are switched off on the device
    #[error("Location services disabled: {0}")]
    LocationServicesDisabled(String),

    /// Malformed definition or configuration input
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider rejected or failed a registration
    #[error("Failed to start geofence service for id {id}: {cause}")]
    Provider {
        /// Geofence id the registration was for
        id: String,
        /// Underlying cause reported by the provider
        cause: String,
    },

    /// The provider never completed a registration within the configured timeout
    #[error("Provider did not complete registration of {id} within {timeout:?}")]
    ProviderTimeout {
        /// Geofence id the registration was for
        id: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Underlying storage I/O or serialization failure
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// A persisted record could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a location services disabled error
    pub fn location_services_disabled(msg: impl Into<String>) -> Self {
        Self::LocationServicesDisabled(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a provider error for a geofence id
    pub fn provider(id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Provider {
            id: id.into(),
            cause: cause.into(),
        }
    }

    /// Create a provider timeout error
    pub fn provider_timeout(id: impl Into<String>, timeout: Duration) -> Self {
        Self::ProviderTimeout {
            id: id.into(),
            timeout,
        }
    }

    /// Create a store I/O error
    pub fn store_io(msg: impl Into<String>) -> Self {
        Self::StoreIo(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable error code handed to the host bridge
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission_denied",
            Self::LocationServicesDisabled(_) => "location_services_disabled",
            Self::Validation(_) | Self::Config(_) => "validation_error",
            Self::Provider { .. } | Self::ProviderTimeout { .. } => "geofence_exception",
            Self::StoreIo(_) | Self::Decode(_) | Self::NotFound(_) => "store_error",
        }
    }

    /// Geofence id carried by registration failures
    pub fn geofence_id(&self) -> Option<&str> {
        match self {
            Self::Provider { id, .. } | Self::ProviderTimeout { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::permission_denied("x").code(), "permission_denied");
        assert_eq!(
            Error::location_services_disabled("x").code(),
            "location_services_disabled"
        );
        assert_eq!(Error::provider("home", "boom").code(), "geofence_exception");
        assert_eq!(Error::decode("bad").code(), "store_error");
    }

    #[test]
    fn test_provider_error_carries_id() {
        let err = Error::provider("home", "GEOFENCE_NOT_AVAILABLE");
        assert_eq!(err.geofence_id(), Some("home"));
        assert!(err.to_string().contains("home"));
        assert!(err.to_string().contains("GEOFENCE_NOT_AVAILABLE"));

        let timeout = Error::provider_timeout("work", Duration::from_secs(5));
        assert_eq!(timeout.geofence_id(), Some("work"));
        assert_eq!(Error::validation("x").geofence_id(), None);
    }
}
