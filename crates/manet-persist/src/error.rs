//! Error types for the engine.

use manet_persist_core::CoreError;
use manet_persist_store::StoreError;
use manet_persist_sync::{ConfigError, SyncError};
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Message or event rejected by the core types.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Config file could not be read.
    #[error("config file: {0}")]
    ConfigFile(#[from] std::io::Error),

    /// Config file is not valid JSON.
    #[error("config parse: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The store did not answer in time.
    #[error("store query timed out: {0}")]
    StoreTimeout(String),

    /// The store already holds this uid at or past the version just assigned.
    #[error("version conflict on {uid}: assigned {version}, store holds {existing}")]
    VersionConflict {
        uid: String,
        version: u32,
        existing: u32,
    },

    /// No algorithm registered under this name.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
