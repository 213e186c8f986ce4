//! Error types for the core crate.

use thiserror::Error;

use crate::types::MessageUid;

/// Errors raised while building or decoding core structures.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("duplicate manifest entry for {0}")]
    DuplicateEntry(MessageUid),

    #[error("missing algorithm name")]
    MissingAlgorithm,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
