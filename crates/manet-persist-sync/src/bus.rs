//! Event bus abstraction.
//!
//! The bus is the only way nodes talk to each other. It is broadcast only,
//! unreliable, and unordered; implementations may sit on UDP multicast,
//! NORM, or anything else that can carry an encoded [`PersistEvent`].

use std::time::Duration;

use async_trait::async_trait;

use manet_persist_core::{NodeId, PersistEvent, TransportProperties};

use crate::error::Result;

/// An event as delivered by the bus.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Node that published the event.
    pub source: NodeId,
    /// Channel the event was published on.
    pub destination: String,
    /// Delivery properties the publisher asked for.
    pub properties: TransportProperties,
    /// The decoded event.
    pub event: PersistEvent,
}

/// Broadcast bus for persistence traffic.
///
/// Implementations must be thread-safe (Send + Sync). Publishing is
/// fire-and-forget: success means the event left this node, nothing more.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Broadcast an event on a channel.
    async fn publish(
        &self,
        destination: &str,
        properties: TransportProperties,
        event: PersistEvent,
    ) -> Result<()>;

    /// Receive the next event from any node, including this one if the
    /// transport loops broadcasts back.
    async fn recv(&self) -> Result<Envelope>;

    /// Receive with timeout.
    ///
    /// Returns None if timeout expires before an event arrives.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Envelope>>;

    /// Get the local node's identity.
    fn local_node_id(&self) -> &NodeId;
}

/// An in-memory bus for tests and simulations.
///
/// Events are CBOR-encoded on publish and decoded on receive, so the path
/// through the codec is the same as on a real transport. Links between
/// nodes can be severed to model partitions.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    use crate::error::SyncError;

    /// Per-node inbound queue depth; overflow is dropped like a full socket buffer.
    const QUEUE_DEPTH: usize = 1024;

    /// Encoded event in flight.
    #[derive(Debug, Clone)]
    struct Frame {
        source: NodeId,
        destination: String,
        properties: TransportProperties,
        bytes: Arc<Vec<u8>>,
    }

    /// Shared state for the memory bus network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        /// Inbound queue for each node.
        senders: RwLock<HashMap<NodeId, mpsc::Sender<Frame>>>,
        /// Severed links, stored in both directions.
        severed: RwLock<HashSet<(NodeId, NodeId)>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Attach a node and return its bus.
        pub async fn attach(self: &Arc<Self>, node_id: NodeId) -> MemoryBus {
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

            self.senders.write().await.insert(node_id.clone(), tx);

            MemoryBus {
                node_id,
                network: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// Drop all traffic between `a` and `b`.
        pub async fn sever(&self, a: &NodeId, b: &NodeId) {
            let mut severed = self.severed.write().await;
            severed.insert((a.clone(), b.clone()));
            severed.insert((b.clone(), a.clone()));
        }

        /// Restore the link between `a` and `b`.
        pub async fn heal(&self, a: &NodeId, b: &NodeId) {
            let mut severed = self.severed.write().await;
            severed.remove(&(a.clone(), b.clone()));
            severed.remove(&(b.clone(), a.clone()));
        }

        /// Restore every link.
        pub async fn heal_all(&self) {
            self.severed.write().await.clear();
        }

        async fn deliver(&self, frame: Frame) {
            let senders = self.senders.read().await;
            let severed = self.severed.read().await;

            for (peer, sender) in senders.iter() {
                if severed.contains(&(frame.source.clone(), peer.clone())) {
                    continue;
                }
                if sender.try_send(frame.clone()).is_err() {
                    tracing::trace!(peer = %peer, "dropped frame: queue full or closed");
                }
            }
        }
    }

    /// In-memory bus handle for one node.
    pub struct MemoryBus {
        node_id: NodeId,
        network: Arc<MemoryNetwork>,
        receiver: Mutex<mpsc::Receiver<Frame>>,
    }

    impl MemoryBus {
        pub fn network(&self) -> &Arc<MemoryNetwork> {
            &self.network
        }

        fn decode(frame: Frame) -> Option<Envelope> {
            match PersistEvent::from_bytes(&frame.bytes) {
                Ok(event) => Some(Envelope {
                    source: frame.source,
                    destination: frame.destination,
                    properties: frame.properties,
                    event,
                }),
                Err(e) => {
                    tracing::debug!(source = %frame.source, error = %e, "ignoring malformed event");
                    None
                }
            }
        }
    }

    #[async_trait]
    impl EventBus for MemoryBus {
        async fn publish(
            &self,
            destination: &str,
            properties: TransportProperties,
            event: PersistEvent,
        ) -> Result<()> {
            let frame = Frame {
                source: self.node_id.clone(),
                destination: destination.to_string(),
                properties,
                bytes: Arc::new(event.to_bytes()?),
            };
            self.network.deliver(frame).await;
            Ok(())
        }

        async fn recv(&self) -> Result<Envelope> {
            let mut rx = self.receiver.lock().await;
            loop {
                match rx.recv().await {
                    Some(frame) => {
                        if let Some(envelope) = Self::decode(frame) {
                            return Ok(envelope);
                        }
                    }
                    None => return Err(SyncError::TransportError("channel closed".into())),
                }
            }
        }

        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Envelope>> {
            match tokio::time::timeout(timeout, self.recv()).await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            }
        }

        fn local_node_id(&self) -> &NodeId {
            &self.node_id
        }
    }

    /// Raw access used by tests to inject undecodable traffic.
    #[cfg(test)]
    impl MemoryNetwork {
        pub(crate) async fn inject_raw(&self, source: NodeId, bytes: Vec<u8>) {
            self.deliver(Frame {
                source,
                destination: "test".into(),
                properties: TransportProperties::default(),
                bytes: Arc::new(bytes),
            })
            .await;
        }
    }
}
