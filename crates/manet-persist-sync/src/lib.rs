//! # MANET Persist Sync
//!
//! Anti-entropy algorithms that keep a set of versioned messages eventually
//! consistent across nodes sharing an unreliable broadcast bus.
//!
//! ## Overview
//!
//! Every algorithm is a periodic task with an event handler. The task runs
//! one step per epoch while the algorithm is active; the handler reacts to
//! manifests and requests published by other nodes. Nothing is acknowledged:
//! a lost broadcast is simply rediscovered on a later epoch.
//!
//! ## Algorithms
//!
//! - [`ManifestAlgorithm`] - broadcasts the full local manifest every epoch,
//!   pushes newer data and requests older data by direct comparison.
//! - [`TrickleAlgorithm`] - keeps a per-message Trickle timer and only
//!   advertises messages whose timer expired without enough corroboration.
//!
//! ## Key Properties
//!
//! - **Idempotent**: store writes merge by version, never by arrival time
//! - **Self-healing**: lost traffic is repaired by later epochs
//! - **Independent**: algorithms are tagged by name and ignore each other
//!
//! ## Message Flow (manifest algorithm)
//!
//! ```text
//! Node A (m1 @ v1)                    Node B (no m1)
//!   |-------- Manifest {m1: 1} ------->|  placeholder m1 @ v0
//!   |<------- Requests {m1: 0} --------|
//!   |-------- Message m1 @ v1 -------->|  stored
//! ```

pub mod algorithm;
pub mod bus;
pub mod config;
pub mod convergence;
pub mod error;
pub mod manifest;
pub mod trickle;

pub use algorithm::{unix_now, AlgorithmContext, AlgorithmHandle, PersistenceAlgorithm};
pub use bus::{memory::MemoryBus, memory::MemoryNetwork, Envelope, EventBus};
pub use config::{ConfigError, ManifestConfig, TrickleConfig};
pub use convergence::{compare_with_manifest, compute_store_digest, ConvergenceResult, StoreDigest};
pub use error::{Result, SyncError};
pub use manifest::{ManifestAlgorithm, ALGORITHM_NAME as MANIFEST_ALGORITHM};
pub use trickle::{TrickleAlgorithm, TrickleTimer, ALGORITHM_NAME as TRICKLE_ALGORITHM};
