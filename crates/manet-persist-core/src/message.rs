//! Versioned application messages and their transport envelope.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::manifest::ManifestEntry;
use crate::types::MessageUid;

/// Payload stored for placeholders until the real content arrives.
pub const PLACEHOLDER_PAYLOAD: &[u8] = b"<< NO DATA >>";

/// A message at a specific version.
///
/// For a fixed uid, a node's stored version never decreases. Version 0 is
/// reserved for placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub uid: MessageUid,
    pub version: u32,
    pub payload: Bytes,
}

impl ApplicationMessage {
    pub fn new(uid: MessageUid, version: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            uid,
            version,
            payload: payload.into(),
        }
    }

    /// Create a version-0 stub for a uid heard from a peer.
    pub fn placeholder(uid: MessageUid) -> Self {
        Self {
            uid,
            version: 0,
            payload: Bytes::from_static(PLACEHOLDER_PAYLOAD),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.version == 0
    }

    /// The manifest entry advertising this message.
    pub fn entry(&self) -> ManifestEntry {
        ManifestEntry::new(self.uid.clone(), self.version)
    }
}

/// Delivery properties attached to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportProperties {
    /// Request reliable delivery from the transport.
    pub reliable: bool,
    /// Unix time (seconds) until which the message is persisted.
    ///
    /// `0` means not persistent; a negative value never expires.
    pub persist_until: i64,
    /// Request ordered delivery from the transport.
    pub ordered: bool,
}

impl TransportProperties {
    pub const fn new(reliable: bool, persist_until: i64, ordered: bool) -> Self {
        Self {
            reliable,
            persist_until,
            ordered,
        }
    }

    /// Properties used for algorithm traffic (manifests and requests).
    pub const fn control(reliable: bool) -> Self {
        Self::new(reliable, 0, false)
    }

    /// Properties attached to locally synthesized placeholders.
    pub const fn placeholder() -> Self {
        Self::new(false, -1, false)
    }

    pub fn is_persistent(&self) -> bool {
        self.persist_until != 0
    }

    /// Whether the persistence window has closed at `now` (Unix seconds).
    pub fn is_expired(&self, now: i64) -> bool {
        self.persist_until >= 0 && self.persist_until < now
    }
}

impl Default for TransportProperties {
    fn default() -> Self {
        Self::new(false, 0, false)
    }
}

/// A message as held by the store: the message plus the channel and
/// properties it was published with, so it can be re-published unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Destination channel; `None` for placeholders.
    pub destination: Option<String>,
    pub properties: TransportProperties,
    pub message: ApplicationMessage,
}

impl StoredMessage {
    pub fn new(
        destination: impl Into<String>,
        properties: TransportProperties,
        message: ApplicationMessage,
    ) -> Self {
        Self {
            destination: Some(destination.into()),
            properties,
            message,
        }
    }

    pub fn placeholder(uid: MessageUid) -> Self {
        Self {
            destination: None,
            properties: TransportProperties::placeholder(),
            message: ApplicationMessage::placeholder(uid),
        }
    }

    pub fn uid(&self) -> &MessageUid {
        &self.message.uid
    }

    pub fn version(&self) -> u32 {
        self.message.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder() {
        let uid = MessageUid::new("E1", "C1", "m1");
        let msg = ApplicationMessage::placeholder(uid.clone());
        assert!(msg.is_placeholder());
        assert_eq!(msg.payload.as_ref(), PLACEHOLDER_PAYLOAD);

        let stored = StoredMessage::placeholder(uid);
        assert!(stored.destination.is_none());
        assert!(!stored.properties.is_expired(i64::MAX));
    }

    #[test]
    fn test_expiry() {
        let props = TransportProperties::new(false, 100, false);
        assert!(props.is_persistent());
        assert!(!props.is_expired(100));
        assert!(props.is_expired(101));

        assert!(!TransportProperties::default().is_persistent());
        assert!(TransportProperties::default().is_expired(1));
    }

    #[test]
    fn test_entry() {
        let msg = ApplicationMessage::new(MessageUid::new("E1", "C1", "m1"), 3, "hello");
        let entry = msg.entry();
        assert_eq!(entry.uid, msg.uid);
        assert_eq!(entry.version, 3);
    }
}
