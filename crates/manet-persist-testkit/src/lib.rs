//! # MANET Persist Testkit
//!
//! Testing utilities for MANET Persist.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: simulated clusters of engines on one in-memory bus, with
//!   partitions and convergence polling
//! - **Generators**: Proptest strategies for uids, messages, and manifests
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use manet_persist_testkit::fixtures::{fast_config, Cluster};
//!
//! async fn example() {
//!     let cluster = Cluster::new(3, fast_config()).await.unwrap();
//!     cluster.isolate(2).await;
//!     // ... submit on node 0 ...
//!     cluster.heal_all().await;
//!     assert!(cluster.wait_converged(Duration::from_secs(5)).await.unwrap());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use manet_persist_testkit::generators::manifest;
//!
//! proptest! {
//!     #[test]
//!     fn fragments_stay_small(m in manifest("manifest", 100)) {
//!         for fragment in m.fragment(25) {
//!             prop_assert!(fragment.len() <= 25);
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{fast_config, init_tracing, Cluster, MemoryEngine};
pub use generators::{application_message, manifest, manifest_entries, message_uid, stored_message};
