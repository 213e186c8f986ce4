//! Engine configuration.
//!
//! Loaded from JSON; every field is optional and falls back to the defaults
//! below.
//!
//! ```json
//! {
//!   "store_query_timeout_ms": 5000,
//!   "default_algorithm": "manifest",
//!   "manifest": { "manifest_length": 25, "sleep_ms": 1000 },
//!   "trickle": { "k": 2, "tau_low_ms": 1000, "tau_high_ms": 10000 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use manet_persist_sync::{
    ConfigError, ManifestConfig, TrickleConfig, MANIFEST_ALGORITHM, TRICKLE_ALGORITHM,
};

use crate::error::Result;

/// Names of the built-in algorithms.
pub const ALGORITHM_NAMES: [&str; 2] = [MANIFEST_ALGORITHM, TRICKLE_ALGORITHM];

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on every store query made on behalf of the engine or an algorithm.
    pub store_query_timeout_ms: u64,
    /// Algorithm active after start.
    pub default_algorithm: String,
    pub manifest: ManifestConfig,
    pub trickle: TrickleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_query_timeout_ms: 5000,
            default_algorithm: MANIFEST_ALGORITHM.to_string(),
            manifest: ManifestConfig::default(),
            trickle: TrickleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from a JSON string and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_store_query_timeout_ms(mut self, ms: u64) -> Self {
        self.store_query_timeout_ms = ms;
        self
    }

    pub fn with_default_algorithm(mut self, name: impl Into<String>) -> Self {
        self.default_algorithm = name.into();
        self
    }

    pub fn with_manifest(mut self, manifest: ManifestConfig) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_trickle(mut self, trickle: TrickleConfig) -> Self {
        self.trickle = trickle;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.store_query_timeout_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.store_query_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "store_query_timeout_ms",
            });
        }
        if !ALGORITHM_NAMES.contains(&self.default_algorithm.as_str()) {
            return Err(ConfigError::UnknownAlgorithm(self.default_algorithm.clone()));
        }
        self.manifest.validate()?;
        self.trickle.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_algorithm, "manifest");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json_str(
            r#"{"default_algorithm": "trickle", "manifest": {"sleep_ms": 250}}"#,
        )
        .unwrap();
        assert_eq!(config.default_algorithm, "trickle");
        assert_eq!(config.manifest.sleep_ms, 250);
        assert_eq!(config.manifest.manifest_length, 25);
        assert_eq!(config.trickle, TrickleConfig::default());
    }

    #[test]
    fn test_rejects_bad_config() {
        let err = EngineConfig::from_json_str(r#"{"default_algorithm": "gossip"}"#).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::UnknownAlgorithm(ref name)) if name == "gossip"
        ));

        let err = EngineConfig::from_json_str(r#"{"trickle": {"tau_low_ms": 0}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::Zero { .. })));

        let err = EngineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"store_query_timeout_ms": 750}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.query_timeout(), Duration::from_millis(750));

        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.json")),
            Err(EngineError::ConfigFile(_))
        ));
    }
}
