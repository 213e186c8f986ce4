//! In-memory implementation of the MessageStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use manet_persist_core::{MessageUid, StoredMessage};

use crate::error::{Result, StoreError};
use crate::traits::{merge_outcome, MessageStore, PutResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    messages: RwLock<BTreeMap<MessageUid, StoredMessage>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_all(&self) -> Result<Vec<StoredMessage>> {
        let messages = self.messages.read().map_err(poisoned)?;
        Ok(messages.values().cloned().collect())
    }

    async fn get_by_id(&self, uid: &MessageUid) -> Result<Option<StoredMessage>> {
        let messages = self.messages.read().map_err(poisoned)?;
        Ok(messages.get(uid).cloned())
    }

    async fn put(&self, message: &StoredMessage) -> Result<PutResult> {
        let mut messages = self.messages.write().map_err(poisoned)?;

        let existing = messages.get(message.uid()).map(StoredMessage::version);
        let result = merge_outcome(existing, message.version());
        if result.is_written() {
            messages.insert(message.uid().clone(), message.clone());
        }

        Ok(result)
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let mut messages = self.messages.write().map_err(poisoned)?;
        let before = messages.len();
        messages.retain(|_, m| !m.properties.is_expired(now));
        Ok(before - messages.len())
    }

    async fn count(&self) -> Result<usize> {
        let messages = self.messages.read().map_err(poisoned)?;
        Ok(messages.len())
    }
}
