//! Store trait: the abstract interface for message persistence.
//!
//! This trait allows the algorithms to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use manet_persist_core::{MessageUid, StoredMessage};

use crate::error::Result;

/// Outcome of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// The uid was not stored before.
    Inserted,
    /// A lower version was replaced.
    Updated {
        /// Version that was overwritten.
        previous: u32,
    },
    /// The stored version is equal or newer; nothing was written.
    Stale {
        /// Version that remains stored.
        existing: u32,
    },
}

impl PutResult {
    /// Whether the write changed the store.
    pub fn is_written(&self) -> bool {
        !matches!(self, PutResult::Stale { .. })
    }
}

/// Async interface for message persistence.
///
/// # Design Notes
///
/// - **One row per uid**: the store never holds two versions of a message.
/// - **Versioned merge**: `put` writes only if the uid is absent or the new
///   version is strictly greater. Equal or lower versions return `Stale`.
///   This makes every write idempotent and placeholder creation safe.
/// - **Concurrent readers**: implementations must tolerate reads from the
///   algorithm loops and the bus dispatch task at the same time.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Snapshot of every stored message, ordered by uid.
    async fn get_all(&self) -> Result<Vec<StoredMessage>>;

    /// Look up a single message.
    async fn get_by_id(&self, uid: &MessageUid) -> Result<Option<StoredMessage>>;

    /// Install a message if it is newer than what is stored.
    async fn put(&self, message: &StoredMessage) -> Result<PutResult>;

    /// Remove messages whose persistence window closed before `now`
    /// (Unix seconds). Returns how many were removed.
    async fn purge_expired(&self, now: i64) -> Result<usize>;

    /// Number of stored messages.
    async fn count(&self) -> Result<usize>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: MessageStore {
    /// Record that a uid exists somewhere without clobbering local data.
    ///
    /// Writes a version-0 placeholder only when the uid is absent.
    fn put_placeholder(
        &self,
        uid: &MessageUid,
    ) -> impl std::future::Future<Output = Result<PutResult>> + Send;

    /// Purge expired messages, then return the remaining snapshot.
    fn live_snapshot(
        &self,
        now: i64,
    ) -> impl std::future::Future<Output = Result<Vec<StoredMessage>>> + Send;
}

impl<S: MessageStore + ?Sized> StoreExt for S {
    async fn put_placeholder(&self, uid: &MessageUid) -> Result<PutResult> {
        if let Some(existing) = self.get_by_id(uid).await? {
            return Ok(PutResult::Stale {
                existing: existing.version(),
            });
        }
        self.put(&StoredMessage::placeholder(uid.clone())).await
    }

    async fn live_snapshot(&self, now: i64) -> Result<Vec<StoredMessage>> {
        let purged = self.purge_expired(now).await?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired messages");
        }
        self.get_all().await
    }
}

/// Decide the outcome of writing `incoming` over `existing`.
pub(crate) fn merge_outcome(existing: Option<u32>, incoming: u32) -> PutResult {
    match existing {
        None => PutResult::Inserted,
        Some(previous) if incoming > previous => PutResult::Updated { previous },
        Some(existing) => PutResult::Stale { existing },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_outcome() {
        assert_eq!(merge_outcome(None, 0), PutResult::Inserted);
        assert_eq!(merge_outcome(Some(1), 2), PutResult::Updated { previous: 1 });
        assert_eq!(merge_outcome(Some(2), 2), PutResult::Stale { existing: 2 });
        assert_eq!(merge_outcome(Some(3), 1), PutResult::Stale { existing: 3 });
        assert_eq!(merge_outcome(Some(0), 0), PutResult::Stale { existing: 0 });
    }
}
