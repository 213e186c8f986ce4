//! # MANET Persist Store
//!
//! The store contract the replication algorithms rely on, with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! The store holds at most one [`StoredMessage`] per uid. Writes go through
//! [`MessageStore::put`], which merges by version comparison: a write only
//! lands if the uid is absent or the new version is strictly greater than
//! the stored one. Arrival order never matters.
//!
//! ## Key Types
//!
//! - [`MessageStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`PutResult`] - Outcome of a versioned write
//!
//! ## Usage
//!
//! ```rust,no_run
//! use manet_persist_core::{ApplicationMessage, MessageUid, StoredMessage, TransportProperties};
//! use manet_persist_store::{MessageStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("messages.db").unwrap();
//!
//!     let uid = MessageUid::new("engine-1", "client-1", "m1");
//!     let msg = ApplicationMessage::new(uid.clone(), 1, "hello");
//!     let props = TransportProperties::new(false, i64::MAX, false);
//!     store.put(&StoredMessage::new("chat", props, msg)).await.unwrap();
//!
//!     let found = store.get_by_id(&uid).await.unwrap();
//!     assert_eq!(found.unwrap().version(), 1);
//! }
//! ```
//!
//! [`StoredMessage`]: manet_persist_core::StoredMessage

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{MessageStore, PutResult, StoreExt};
