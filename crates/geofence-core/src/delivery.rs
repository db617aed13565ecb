//! Transition-delivery configuration records
//!
//! Singleton records read by the (external) delivery path when the provider
//! fires a transition: where to POST a webhook and what local notification
//! to show. Each is replaced wholesale on every save.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Webhook delivery options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfiguration {
    /// Target URL (http or https)
    pub url: String,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    /// Geofence ids that never trigger the webhook
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl WebhookConfiguration {
    /// Create a configuration for `url` with default options
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_ms: default_webhook_timeout_ms(),
            exclude: Vec::new(),
        }
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Parse from the host's JSON map
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("Invalid webhook configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the webhook configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::validation("Webhook URL cannot be empty"));
        }
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(Error::validation(format!(
                "Webhook URL must use HTTP or HTTPS scheme. Got: {}",
                self.url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::validation("Webhook timeout must be > 0"));
        }
        Ok(())
    }

    /// Whether transitions of `geofence_id` should be posted
    pub fn applies_to(&self, geofence_id: &str) -> bool {
        !self.exclude.iter().any(|id| id == geofence_id)
    }
}

/// Local notification shown on a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationConfiguration {
    pub title: String,
    pub text: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_description: String,
}

impl Default for NotificationConfiguration {
    /// Provider defaults, stored when the host configures nothing
    fn default() -> Self {
        Self {
            title: "Geofence transition".to_string(),
            text: "You crossed a monitored area".to_string(),
            channel_id: "geofence-transitions".to_string(),
            channel_name: "Geofence transitions".to_string(),
            channel_description: "Notifications for geofence transitions".to_string(),
        }
    }
}

impl NotificationConfiguration {
    /// Parse from the host's JSON map; missing fields take the defaults
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("Invalid notification configuration: {}", e)))
    }
}

/// Combined configuration accepted by `configure`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Notification to show; `None` stores the defaults
    #[serde(default)]
    pub notification: Option<NotificationConfiguration>,

    /// Webhook to call; `None` leaves any stored webhook untouched
    #[serde(default)]
    pub webhook: Option<WebhookConfiguration>,
}

impl Configuration {
    /// Parse from the host's JSON map
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(webhook) = &self.webhook {
            webhook.validate()?;
        }
        Ok(())
    }
}

fn default_webhook_timeout_ms() -> u64 {
    15_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_validation() {
        assert!(WebhookConfiguration::new("https://example.com/hook").validate().is_ok());
        assert!(WebhookConfiguration::new("http://10.0.0.2/hook").validate().is_ok());
        assert!(matches!(
            WebhookConfiguration::new("").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            WebhookConfiguration::new("ftp://example.com").validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_webhook_from_json_defaults() {
        let config = WebhookConfiguration::from_json(serde_json::json!({
            "url": "https://example.com/hook",
            "exclude": ["home"]
        }))
        .unwrap();

        assert_eq!(config.timeout_ms, 15_000);
        assert!(config.headers.is_empty());
        assert!(!config.applies_to("home"));
        assert!(config.applies_to("work"));

        assert!(WebhookConfiguration::from_json(serde_json::json!({ "headers": {} })).is_err());
    }

    #[test]
    fn test_notification_partial_json_keeps_defaults() {
        let config =
            NotificationConfiguration::from_json(serde_json::json!({ "title": "Welcome home" }))
                .unwrap();
        assert_eq!(config.title, "Welcome home");
        assert_eq!(config.channel_id, NotificationConfiguration::default().channel_id);
    }

    #[test]
    fn test_configuration_rejects_bad_webhook() {
        let result = Configuration::from_json(serde_json::json!({
            "notification": { "text": "hi" },
            "webhook": { "url": "not a url" }
        }));
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
