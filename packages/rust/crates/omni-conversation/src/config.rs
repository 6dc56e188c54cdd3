//! Tracker configuration: history cap, persistence target, context-switch policy.
//!
//! Hosts hand configuration over as a plain key/value mapping. Unknown keys are
//! ignored; recognized keys with invalid values fail fast.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::analysis::HeuristicThresholds;

/// Default cap on retained history records.
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 100;

/// Default persistence target (a JSON file in the working directory).
pub const DEFAULT_PERSISTENCE_TARGET: &str = "plugin_state.json";

/// Error when tracker configuration fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration was not a key/value mapping.
    #[error("tracker configuration must be a key/value mapping, got {0}")]
    NotAMapping(String),

    /// `max_history_size` is negative, zero, or not an integer.
    #[error("max_history_size must be a positive integer, got {0}")]
    InvalidHistorySize(String),

    /// A recognized option carried a value of the wrong type.
    #[error("invalid tracker configuration: {0}")]
    InvalidValue(#[from] serde_json::Error),

    /// A heuristic threshold is non-finite or not strictly positive.
    #[error("threshold {name} must be finite and > 0, got {value}")]
    InvalidThreshold {
        /// Threshold field name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// Persistence is enabled but no target was given.
    #[error("persistence_target must not be empty when enable_persistence is true")]
    EmptyPersistenceTarget,
}

/// Configuration for a `ConversationStateTracker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Cap on retained history records; oldest evicted first.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Load at construction and save after every invocation.
    #[serde(default)]
    pub enable_persistence: bool,
    /// Location of the persistence sink.
    #[serde(default = "default_persistence_target", alias = "state_file")]
    pub persistence_target: String,
    /// Truncate history to the newest 10 records on a detected context switch.
    #[serde(default)]
    pub clear_on_context_switch: bool,
    /// Heuristic constants for pattern and switch detection.
    #[serde(default)]
    pub thresholds: HeuristicThresholds,
    /// Stages the plugin adapter accepts.
    #[serde(default = "default_supported_stages")]
    pub supported_stages: Vec<String>,
}

fn default_max_history_size() -> usize {
    DEFAULT_MAX_HISTORY_SIZE
}

fn default_persistence_target() -> String {
    DEFAULT_PERSISTENCE_TARGET.to_string()
}

fn default_supported_stages() -> Vec<String> {
    vec!["THINK".to_string(), "REVIEW".to_string()]
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_history_size: default_max_history_size(),
            enable_persistence: false,
            persistence_target: default_persistence_target(),
            clear_on_context_switch: false,
            thresholds: HeuristicThresholds::default(),
            supported_stages: default_supported_stages(),
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a host-supplied key/value mapping.
    ///
    /// # Errors
    ///
    /// Returns an error when a recognized key holds an invalid value.
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self, ConfigError> {
        if let Some(raw) = map.get("max_history_size") {
            check_history_size(raw)?;
        }
        let config: Self = serde_json::from_value(Value::Object(map.clone()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate any JSON value; `null` yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object or fails validation.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_map(map),
            other => Err(ConfigError::NotAMapping(other.to_string())),
        }
    }

    /// Validate field values.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::InvalidHistorySize("0".to_string()));
        }
        if self.enable_persistence && self.persistence_target.trim().is_empty() {
            return Err(ConfigError::EmptyPersistenceTarget);
        }
        self.thresholds.validate()
    }

    /// Set the history cap.
    #[must_use]
    pub fn with_max_history_size(mut self, max_history_size: usize) -> Self {
        self.max_history_size = max_history_size;
        self
    }

    /// Enable persistence against `target`.
    #[must_use]
    pub fn with_persistence(mut self, target: impl Into<String>) -> Self {
        self.enable_persistence = true;
        self.persistence_target = target.into();
        self
    }

    /// Toggle history truncation on context switch.
    #[must_use]
    pub fn with_clear_on_context_switch(mut self, enabled: bool) -> Self {
        self.clear_on_context_switch = enabled;
        self
    }
}

fn check_history_size(raw: &Value) -> Result<(), ConfigError> {
    match raw.as_u64() {
        Some(size) if size > 0 => Ok(()),
        _ => Err(ConfigError::InvalidHistorySize(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        }
    }

    #[test]
    fn empty_mapping_uses_defaults() {
        let config = TrackerConfig::from_map(&serde_json::Map::new()).expect("defaults");
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.max_history_size, 100);
        assert_eq!(config.persistence_target, "plugin_state.json");
    }

    #[test]
    fn legacy_state_file_key_is_accepted() {
        let config = TrackerConfig::from_map(&map(json!({"state_file": "legacy.json"})))
            .expect("legacy key");
        assert_eq!(config.persistence_target, "legacy.json");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = TrackerConfig::from_map(&map(json!({"max_history_size": 5, "colour": "red"})))
            .expect("unknown key");
        assert_eq!(config.max_history_size, 5);
    }

    #[test]
    fn invalid_history_sizes_are_rejected() {
        for raw in [json!(-1), json!(0), json!(2.5), json!("10")] {
            let result = TrackerConfig::from_map(&map(json!({ "max_history_size": raw.clone() })));
            assert!(
                matches!(result, Err(ConfigError::InvalidHistorySize(_))),
                "expected rejection for {raw}"
            );
        }
    }

    #[test]
    fn wrong_types_are_not_coerced() {
        let result = TrackerConfig::from_map(&map(json!({"enable_persistence": "yes"})));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn empty_target_with_persistence_is_rejected() {
        let result = TrackerConfig::from_map(&map(
            json!({"enable_persistence": true, "persistence_target": "  "}),
        ));
        assert!(matches!(result, Err(ConfigError::EmptyPersistenceTarget)));
    }

    #[test]
    fn non_mapping_value_is_rejected() {
        assert!(matches!(
            TrackerConfig::from_value(&json!([1, 2])),
            Err(ConfigError::NotAMapping(_))
        ));
        assert!(TrackerConfig::from_value(&Value::Null).is_ok());
    }
}
