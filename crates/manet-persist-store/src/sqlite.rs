//! SQLite implementation of the MessageStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use manet_persist_core::{ApplicationMessage, MessageUid, StoredMessage, TransportProperties};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{merge_outcome, MessageStore, PutResult};

const SELECT_COLUMNS: &str = "src_engine, src_client, local_id, version, destination, payload,
                              reliable, persist_until, ordered";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Delete every stored message.
    pub async fn reset(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM messages", [])?;
            Ok(())
        })
        .await?;
        tracing::info!("message store reset");
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }
}

// Helper to convert a row to StoredMessage
fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let uid = MessageUid::new(
        row.get::<_, String>("src_engine")?,
        row.get::<_, String>("src_client")?,
        row.get::<_, String>("local_id")?,
    );
    let payload: Vec<u8> = row.get("payload")?;

    Ok(StoredMessage {
        destination: row.get("destination")?,
        properties: TransportProperties {
            reliable: row.get("reliable")?,
            persist_until: row.get("persist_until")?,
            ordered: row.get("ordered")?,
        },
        message: ApplicationMessage {
            uid,
            version: row.get("version")?,
            payload: Bytes::from(payload),
        },
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn get_all(&self) -> Result<Vec<StoredMessage>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages ORDER BY src_engine, src_client, local_id",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], row_to_stored)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_by_id(&self, uid: &MessageUid) -> Result<Option<StoredMessage>> {
        let uid = uid.clone();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM messages
                     WHERE src_engine = ?1 AND src_client = ?2 AND local_id = ?3",
                    SELECT_COLUMNS
                ),
                params![uid.origin_engine, uid.origin_client, uid.local_id],
                row_to_stored,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put(&self, message: &StoredMessage) -> Result<PutResult> {
        let message = message.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let uid = message.uid();

            let existing: Option<u32> = tx
                .query_row(
                    "SELECT version FROM messages
                     WHERE src_engine = ?1 AND src_client = ?2 AND local_id = ?3",
                    params![uid.origin_engine, uid.origin_client, uid.local_id],
                    |row| row.get(0),
                )
                .optional()?;

            let result = merge_outcome(existing, message.version());
            if result.is_written() {
                tx.execute(
                    "INSERT INTO messages (
                        src_engine, src_client, local_id, version, destination, payload,
                        reliable, persist_until, ordered, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT (src_engine, src_client, local_id) DO UPDATE SET
                        version = excluded.version,
                        destination = excluded.destination,
                        payload = excluded.payload,
                        reliable = excluded.reliable,
                        persist_until = excluded.persist_until,
                        ordered = excluded.ordered,
                        updated_at = excluded.updated_at",
                    params![
                        uid.origin_engine,
                        uid.origin_client,
                        uid.local_id,
                        message.version(),
                        message.destination,
                        message.message.payload.as_ref(),
                        message.properties.reliable,
                        message.properties.persist_until,
                        message.properties.ordered,
                        now_millis(),
                    ],
                )?;
            }

            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM messages WHERE persist_until >= 0 AND persist_until < ?1",
                params![now],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.blocking(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}
