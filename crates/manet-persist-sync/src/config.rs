//! Algorithm configuration.
//!
//! Both configs deserialize with every field optional, so a config file only
//! needs to name the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use manet_persist_core::limits::MAX_MANIFEST_ENTRIES;

/// Invalid configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} ({value}) exceeds the wire limit of {max}")]
    TooLarge {
        field: &'static str,
        value: usize,
        max: usize,
    },

    #[error("tau_low_ms ({low}) must not exceed tau_high_ms ({high})")]
    TauRange { low: u64, high: u64 },

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Fragments longer than the wire limit are rejected by every receiver.
fn check_manifest_length(manifest_length: usize) -> Result<(), ConfigError> {
    if manifest_length == 0 {
        return Err(ConfigError::Zero {
            field: "manifest_length",
        });
    }
    if manifest_length > MAX_MANIFEST_ENTRIES {
        return Err(ConfigError::TooLarge {
            field: "manifest_length",
            value: manifest_length,
            max: MAX_MANIFEST_ENTRIES,
        });
    }
    Ok(())
}

/// Configuration for the manifest algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Maximum entries per published manifest or requests fragment.
    pub manifest_length: usize,
    /// Epoch length in milliseconds.
    pub sleep_ms: u64,
    /// Channel manifests and requests are published on.
    pub destination: String,
    /// Ask the transport for reliable delivery of manifests.
    pub reliable: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            manifest_length: 25,
            sleep_ms: 1000,
            destination: "manifest-channel".to_string(),
            reliable: false,
        }
    }
}

impl ManifestConfig {
    pub fn with_manifest_length(mut self, manifest_length: usize) -> Self {
        self.manifest_length = manifest_length;
        self
    }

    pub fn with_sleep_ms(mut self, sleep_ms: u64) -> Self {
        self.sleep_ms = sleep_ms;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_manifest_length(self.manifest_length)?;
        if self.sleep_ms == 0 {
            return Err(ConfigError::Zero { field: "sleep_ms" });
        }
        if self.destination.is_empty() {
            return Err(ConfigError::Empty("destination"));
        }
        Ok(())
    }
}

/// Configuration for the Trickle algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrickleConfig {
    /// Redundancy constant: an interval with `k` or more equal adverts
    /// heard stays silent.
    pub k: u32,
    /// Minimum interval length in milliseconds.
    pub tau_low_ms: u64,
    /// Maximum interval length in milliseconds.
    pub tau_high_ms: u64,
    /// How often the timer table is scanned, in milliseconds.
    pub advert_ms: u64,
    /// Maximum entries per published manifest or requests fragment.
    pub manifest_length: usize,
    /// Channel adverts and requests are published on.
    pub destination: String,
    pub reliable: bool,
}

impl Default for TrickleConfig {
    fn default() -> Self {
        Self {
            k: 2,
            tau_low_ms: 1000,
            tau_high_ms: 10_000,
            advert_ms: 100,
            manifest_length: 25,
            destination: "trickle-channel".to_string(),
            reliable: false,
        }
    }
}

impl TrickleConfig {
    pub fn with_k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }

    pub fn with_tau(mut self, low_ms: u64, high_ms: u64) -> Self {
        self.tau_low_ms = low_ms;
        self.tau_high_ms = high_ms;
        self
    }

    pub fn with_advert_ms(mut self, advert_ms: u64) -> Self {
        self.advert_ms = advert_ms;
        self
    }

    pub fn with_manifest_length(mut self, manifest_length: usize) -> Self {
        self.manifest_length = manifest_length;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn tau_low(&self) -> Duration {
        Duration::from_millis(self.tau_low_ms)
    }

    pub fn tau_high(&self) -> Duration {
        Duration::from_millis(self.tau_high_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.advert_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::Zero { field: "k" });
        }
        if self.tau_low_ms == 0 {
            return Err(ConfigError::Zero {
                field: "tau_low_ms",
            });
        }
        if self.tau_low_ms > self.tau_high_ms {
            return Err(ConfigError::TauRange {
                low: self.tau_low_ms,
                high: self.tau_high_ms,
            });
        }
        if self.advert_ms == 0 {
            return Err(ConfigError::Zero { field: "advert_ms" });
        }
        check_manifest_length(self.manifest_length)?;
        if self.destination.is_empty() {
            return Err(ConfigError::Empty("destination"));
        }
        Ok(())
    }
}
