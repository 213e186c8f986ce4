//! # MANET Persist
//!
//! Eventually consistent message persistence for mobile ad-hoc networks.
//!
//! ## Overview
//!
//! Nodes share a lossy broadcast bus and each keeps a store of versioned
//! messages. Persistence algorithms run on every node and repair divergence
//! without acknowledgements:
//!
//! - **Manifest**: broadcast every held version each epoch; push newer data,
//!   request older data.
//! - **Trickle**: per-message timers that back off while neighbours agree
//!   and speed up when they don't.
//!
//! ## Key Concepts
//!
//! - **Uid**: `(origin_engine, origin_client, local_id)`, stable across versions.
//! - **Version**: grows by one on every persistent resubmission of a uid.
//!   A stored version never goes backwards.
//! - **Placeholder**: version 0, recorded when a peer is heard to hold a uid
//!   we have not seen. It is replaced as soon as real content arrives.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use manet_persist::{Engine, EngineConfig};
//! use manet_persist::core::{NodeId, TransportProperties};
//! use manet_persist::store::SqliteStore;
//! use manet_persist::sync::MemoryNetwork;
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let bus = network.attach(NodeId::new("engine-1")).await;
//!     let store = SqliteStore::open("messages.db").unwrap();
//!
//!     let engine = Engine::start(store, bus, EngineConfig::default()).unwrap();
//!
//!     // Persist until the end of 2030
//!     let props = TransportProperties::new(false, 1_924_991_999, false);
//!     let msg = engine
//!         .submit("client-1", "status", "chat", props, "hello")
//!         .await
//!         .unwrap();
//!     assert_eq!(msg.version, 1);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `manet_persist::core` - Message model and wire format
//! - `manet_persist::store` - Storage abstraction and SQLite
//! - `manet_persist::sync` - Bus abstraction and persistence algorithms

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;

// Re-export component crates
pub use manet_persist_core as core;
pub use manet_persist_store as store;
pub use manet_persist_sync as sync;

// Re-export main types for convenience
pub use config::{EngineConfig, ALGORITHM_NAMES};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use manager::{NetworkDensity, PersistenceManager};

// Re-export commonly used core types
pub use manet_persist_core::{
    ApplicationMessage, ManifestEntry, MessageUid, NodeId, StoredMessage, TransportProperties,
};
