//! Defense Configuration
//!
//! Thresholds and limits for the defense state machine, plus the service
//! settings for the HTTP API. Defaults are conservative.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::value::{Map, Value};

/// Contract version spoken by this build
pub const CONTRACT_VERSION: i64 = 3;

/// Component name requests must be addressed to
pub const DEFAULT_COMPONENT: &str = "adn";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-node defense thresholds, immutable for the duration of an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDefenseConfig {
    /// Average severity at or above which risk is CRITICAL
    pub lockdown_threshold: f64,

    /// Average severity at or above which risk is ELEVATED
    pub partial_lock_threshold: f64,

    /// Withdrawal ceiling in normal operation
    pub max_withdrawals_per_min: u32,

    /// RPC requests per minute in normal operation
    pub rpc_rate_limit: u32,

    /// Size of the active-event window; oldest events are evicted first
    pub max_active_events: usize,
}

impl Default for NodeDefenseConfig {
    fn default() -> Self {
        Self {
            lockdown_threshold: 0.75,
            partial_lock_threshold: 0.5,
            max_withdrawals_per_min: 50,
            rpc_rate_limit: 1000,
            max_active_events: 1024,
        }
    }
}

impl NodeDefenseConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.lockdown_threshold.is_finite() || !self.partial_lock_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "thresholds must be finite numbers".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.partial_lock_threshold)
            || !(0.0..=1.0).contains(&self.lockdown_threshold)
        {
            return Err(ConfigError::Invalid(format!(
                "thresholds must lie in [0, 1] (partial={}, lockdown={})",
                self.partial_lock_threshold, self.lockdown_threshold
            )));
        }

        if self.partial_lock_threshold > self.lockdown_threshold {
            return Err(ConfigError::Invalid(format!(
                "partial_lock_threshold ({}) must not exceed lockdown_threshold ({})",
                self.partial_lock_threshold, self.lockdown_threshold
            )));
        }

        if self.max_active_events == 0 {
            return Err(ConfigError::Invalid(
                "max_active_events must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Value form used for the config fingerprint
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("lockdown_threshold".to_string(), Value::Float(self.lockdown_threshold));
        map.insert(
            "partial_lock_threshold".to_string(),
            Value::Float(self.partial_lock_threshold),
        );
        map.insert(
            "max_withdrawals_per_min".to_string(),
            Value::Int(i64::from(self.max_withdrawals_per_min)),
        );
        map.insert("rpc_rate_limit".to_string(), Value::Int(i64::from(self.rpc_rate_limit)));
        map.insert(
            "max_active_events".to_string(),
            Value::Int(self.max_active_events as i64),
        );
        Value::Object(map)
    }
}

/// Settings for the long-running service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Port for the HTTP API
    pub api_port: u16,

    /// Name of the node this service defends (status output only)
    pub node_name: String,

    /// Component name requests must carry
    pub component: String,

    /// State machine thresholds
    pub defense: NodeDefenseConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            node_name: "local".to_string(),
            component: DEFAULT_COMPONENT.to_string(),
            defense: NodeDefenseConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    // Builder-style methods for CLI overrides

    pub fn with_api_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.api_port = port;
        }
        self
    }

    pub fn with_node_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.node_name = name;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.component.trim().is_empty() {
            return Err(ConfigError::Invalid("component must not be blank".to_string()));
        }

        if self.node_name.trim().is_empty() {
            return Err(ConfigError::Invalid("node_name must not be blank".to_string()));
        }

        self.defense.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeDefenseConfig::default();
        assert_eq!(config.lockdown_threshold, 0.75);
        assert_eq!(config.partial_lock_threshold, 0.5);
        assert_eq!(config.max_withdrawals_per_min, 50);
        assert_eq!(config.rpc_rate_limit, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = NodeDefenseConfig::default();

        // Invalid: partial above lockdown
        config.partial_lock_threshold = 0.9;
        assert!(config.validate().is_err());

        config = NodeDefenseConfig::default();
        config.lockdown_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config = NodeDefenseConfig::default();
        config.lockdown_threshold = 1.5;
        assert!(config.validate().is_err());

        config = NodeDefenseConfig::default();
        config.max_active_events = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = ServiceConfig::default()
            .with_api_port(Some(9090))
            .with_node_name(None);

        assert_eq!(config.api_port, 9090);
        assert_eq!(config.node_name, "local");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_component_rejected() {
        let config = ServiceConfig {
            component: "  ".to_string(),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adn.toml");

        let mut config = ServiceConfig::default();
        config.defense.lockdown_threshold = 0.8;
        config.node_name = "dgb-node-1".to_string();
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            api_port = 9000

            [defense]
            rpc_rate_limit = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.component, DEFAULT_COMPONENT);
        assert_eq!(config.defense.rpc_rate_limit, 500);
        assert_eq!(config.defense.lockdown_threshold, 0.75);
    }
}
