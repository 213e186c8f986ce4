//! Identity types.
//!
//! Identifiers are newtypes so a node id can never be passed where a
//! message uid is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an engine instance on the bus.
///
/// The same string is used as `origin_engine` for messages produced
/// locally, so it must be stable for the lifetime of the node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create from an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random node ID (128 bits, hex encoded).
    pub fn random() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Globally unique identity of a logical message.
///
/// A uid is independent of version: every revision of the same object
/// shares one uid. Equality and hashing are structural over the triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageUid {
    /// Engine that first produced the message.
    pub origin_engine: String,
    /// Client on that engine which produced it.
    pub origin_client: String,
    /// Client-chosen identifier.
    pub local_id: String,
}

impl MessageUid {
    pub fn new(
        origin_engine: impl Into<String>,
        origin_client: impl Into<String>,
        local_id: impl Into<String>,
    ) -> Self {
        Self {
            origin_engine: origin_engine.into(),
            origin_client: origin_client.into(),
            local_id: local_id.into(),
        }
    }
}

impl fmt::Display for MessageUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.origin_engine, self.origin_client, self.local_id
        )
    }
}
