//! Configuration module for the selector

use selector_core::SelectMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Registry path of the service; instances are its children
    pub base_path: String,

    /// Only servers declaring this group are selected
    pub group: String,

    /// Selection strategy
    pub select_mode: SelectMode,

    /// Connect timeout per dial, in milliseconds
    pub dial_timeout_ms: u64,

    /// How long a failed dial is remembered before redialing, in milliseconds
    pub dial_retry_cooldown_ms: u64,

    /// Caller latitude for closest selection
    pub latitude: f64,

    /// Caller longitude for closest selection
    pub longitude: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            base_path: "/rpc/services".to_string(),
            group: String::new(),
            select_mode: SelectMode::Random,
            dial_timeout_ms: 5_000,
            dial_retry_cooldown_ms: 5_000,
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl SelectorConfig {
    /// Create a configuration for the service at `base_path`
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: SelectMode) -> Self {
        self.select_mode = mode;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.dial_retry_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn dial_retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.dial_retry_cooldown_ms)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = SelectorConfig::default();

        if let Ok(path) = std::env::var("SELECTOR_BASE_PATH") {
            config.base_path = path;
        }

        if let Ok(group) = std::env::var("SELECTOR_GROUP") {
            config.group = group;
        }

        if let Ok(mode) = std::env::var("SELECTOR_MODE") {
            match mode.parse() {
                Ok(mode) => config.select_mode = mode,
                Err(err) => warn!(error = %err, "Ignoring SELECTOR_MODE"),
            }
        }

        if let Ok(timeout) = std::env::var("SELECTOR_DIAL_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                config.dial_timeout_ms = timeout;
            }
        }

        if let Ok(cooldown) = std::env::var("SELECTOR_DIAL_COOLDOWN_MS") {
            if let Ok(cooldown) = cooldown.parse() {
                config.dial_retry_cooldown_ms = cooldown;
            }
        }

        if let Ok(latitude) = std::env::var("SELECTOR_LATITUDE") {
            if let Ok(latitude) = latitude.parse() {
                config.latitude = latitude;
            }
        }

        if let Ok(longitude) = std::env::var("SELECTOR_LONGITUDE") {
            if let Ok(longitude) = longitude.parse() {
                config.longitude = longitude;
            }
        }

        config
    }

    /// Parse configuration from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SelectorConfig::default();
        assert_eq!(config.select_mode, SelectMode::Random);
        assert_eq!(config.dial_timeout(), Duration::from_secs(5));
        assert!(config.group.is_empty());
    }

    #[test]
    fn test_from_json_partial() {
        let config = SelectorConfig::from_json(
            r#"{"base_path": "/rpc/Arith", "select_mode": "weighted_round_robin", "group": "blue"}"#,
        )
        .unwrap();

        assert_eq!(config.base_path, "/rpc/Arith");
        assert_eq!(config.select_mode, SelectMode::WeightedRoundRobin);
        assert_eq!(config.group, "blue");
        assert_eq!(config.dial_retry_cooldown_ms, 5_000);
    }

    #[test]
    fn test_from_json_rejects_unknown_mode() {
        assert!(SelectorConfig::from_json(r#"{"select_mode": "least_active"}"#).is_err());
    }

    #[test]
    fn test_builder_setters() {
        let config = SelectorConfig::new("/rpc/Arith")
            .with_mode(SelectMode::Closest)
            .with_location(39.9, 116.4)
            .with_dial_timeout(Duration::from_millis(250));

        assert_eq!(config.select_mode, SelectMode::Closest);
        assert_eq!(config.latitude, 39.9);
        assert_eq!(config.dial_timeout_ms, 250);
    }
}
