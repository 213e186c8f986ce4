//! Events carried on the bus and their CBOR encoding.
//!
//! The event kind is decided once, at decode time. Consumers `match` on
//! [`PersistEvent`] instead of probing payload types.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::manifest::{MessageManifest, MessageRequests};
use crate::message::ApplicationMessage;

/// Size limits enforced when decoding events.
pub mod limits {
    /// Max entries in a single manifest or request set.
    pub const MAX_MANIFEST_ENTRIES: usize = 1000;
    /// Max message payload: the largest UDP datagram payload over IPv4.
    pub const MAX_PAYLOAD_BYTES: usize = 65_507;
}

/// Everything the persistence layer publishes on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistEvent {
    /// A full message at some version.
    Message(ApplicationMessage),
    /// Advertisement of held versions.
    Manifest(MessageManifest),
    /// Request for newer versions.
    Requests(MessageRequests),
}

impl PersistEvent {
    /// Algorithm that produced the event; `None` for plain messages.
    pub fn algorithm_name(&self) -> Option<&str> {
        match self {
            PersistEvent::Message(_) => None,
            PersistEvent::Manifest(m) => Some(m.algorithm_name()),
            PersistEvent::Requests(r) => Some(r.algorithm_name()),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PersistEvent::Message(_) => "message",
            PersistEvent::Manifest(_) => "manifest",
            PersistEvent::Requests(_) => "requests",
        }
    }

    /// Check size limits and manifest invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            PersistEvent::Message(msg) => {
                if msg.payload.len() > limits::MAX_PAYLOAD_BYTES {
                    return Err(CoreError::LimitExceeded("payload too large"));
                }
                Ok(())
            }
            PersistEvent::Manifest(m) => m.validate(),
            PersistEvent::Requests(r) => r.validate(),
        }
    }

    /// Encode to CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR and validate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let event: PersistEvent =
            ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }
}

impl From<ApplicationMessage> for PersistEvent {
    fn from(msg: ApplicationMessage) -> Self {
        PersistEvent::Message(msg)
    }
}

impl From<MessageManifest> for PersistEvent {
    fn from(m: MessageManifest) -> Self {
        PersistEvent::Manifest(m)
    }
}

impl From<MessageRequests> for PersistEvent {
    fn from(r: MessageRequests) -> Self {
        PersistEvent::Requests(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use crate::types::MessageUid;

    #[test]
    fn test_decode_keeps_kind() {
        let mut requests = MessageRequests::new("manifest");
        requests.push(ManifestEntry::new(MessageUid::new("E1", "C1", "m1"), 0));
        let event = PersistEvent::from(requests);

        let decoded = PersistEvent::from_bytes(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.kind(), "requests");
        assert_eq!(decoded.algorithm_name(), Some("manifest"));
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_message_payload_survives() {
        let msg = ApplicationMessage::new(MessageUid::new("E1", "C1", "m1"), 1, "hello");
        let decoded = PersistEvent::from_bytes(&PersistEvent::from(msg.clone()).to_bytes().unwrap())
            .unwrap();
        match decoded {
            PersistEvent::Message(m) => assert_eq!(m.payload.as_ref(), b"hello"),
            other => panic!("expected message, got {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            PersistEvent::from_bytes(&[0xff, 0x00, 0x13]),
            Err(CoreError::DecodingError(_))
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let msg = ApplicationMessage::new(
            MessageUid::new("E1", "C1", "big"),
            1,
            vec![0u8; limits::MAX_PAYLOAD_BYTES + 1],
        );
        let bytes = PersistEvent::from(msg).to_bytes().unwrap();
        assert!(matches!(
            PersistEvent::from_bytes(&bytes),
            Err(CoreError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_json_shape_is_tagged() {
        let event = PersistEvent::from(MessageManifest::new("trickle"));
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("Manifest").is_some());
    }
}
