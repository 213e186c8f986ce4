//! # MANET Persist Core
//!
//! Pure primitives for the persistence layer of a store-and-forward
//! transport: versioned messages, manifests, and the events exchanged
//! on the bus.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`MessageUid`] - Identity of a logical message, independent of version
//! - [`ApplicationMessage`] - A message at a specific version
//! - [`MessageManifest`] - Batch advertisement of `(uid, version)` pairs
//! - [`MessageRequests`] - Batch request for newer copies
//! - [`PersistEvent`] - Tagged union of everything the algorithms put on the bus
//!
//! ## Versioning
//!
//! Versions start at 1 for produced data. Version 0 marks a placeholder:
//! the identity is known locally but the payload has not arrived yet.

pub mod error;
pub mod manifest;
pub mod message;
pub mod types;
pub mod wire;

pub use error::{CoreError, Result};
pub use manifest::{ManifestEntry, MessageManifest, MessageRequests};
pub use message::{ApplicationMessage, StoredMessage, TransportProperties, PLACEHOLDER_PAYLOAD};
pub use types::{MessageUid, NodeId};
pub use wire::{limits, PersistEvent};
