//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur while running persistence algorithms.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    StoreError(#[from] manet_persist_store::StoreError),

    /// Event could not be encoded or decoded.
    #[error("codec error: {0}")]
    CodecError(#[from] manet_persist_core::CoreError),

    /// Timeout waiting for the store.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
