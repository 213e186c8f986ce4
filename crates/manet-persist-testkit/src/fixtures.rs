//! Test fixtures and helpers.
//!
//! Simulated clusters of engines sharing one in-memory bus.

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::time::Instant;

use manet_persist::{Engine, EngineConfig, Result};
use manet_persist_core::{MessageUid, NodeId};
use manet_persist_store::{MemoryStore, MessageStore};
use manet_persist_sync::{ManifestConfig, MemoryBus, MemoryNetwork, StoreDigest, TrickleConfig};

/// Engine over memory store and memory bus.
pub type MemoryEngine = Engine<MemoryStore, MemoryBus>;

const POLL: Duration = Duration::from_millis(10);

/// Install a test subscriber once per process.
///
/// Output goes through the test writer, so it only shows for failing tests.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Short epochs so clusters converge in well under a second.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_store_query_timeout_ms(1000)
        .with_manifest(ManifestConfig::default().with_sleep_ms(50))
        .with_trickle(
            TrickleConfig::default()
                .with_tau(100, 800)
                .with_advert_ms(10),
        )
}

/// A set of engines on one simulated network.
pub struct Cluster {
    network: Arc<MemoryNetwork>,
    nodes: Vec<MemoryEngine>,
}

impl Cluster {
    /// Start `size` engines named `E1`, `E2`, ...
    pub async fn new(size: usize, config: EngineConfig) -> Result<Self> {
        let network = MemoryNetwork::new();
        let mut nodes = Vec::with_capacity(size);
        for i in 1..=size {
            let bus = network.attach(NodeId::new(format!("E{i}"))).await;
            nodes.push(Engine::start(MemoryStore::new(), bus, config.clone())?);
        }
        Ok(Self { network, nodes })
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    pub fn nodes(&self) -> &[MemoryEngine] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &MemoryEngine {
        &self.nodes[index]
    }

    /// Cut the link between two nodes.
    pub async fn partition(&self, a: usize, b: usize) {
        self.network
            .sever(self.nodes[a].node_id(), self.nodes[b].node_id())
            .await;
    }

    /// Cut one node off from every other.
    pub async fn isolate(&self, index: usize) {
        for other in 0..self.nodes.len() {
            if other != index {
                self.partition(index, other).await;
            }
        }
    }

    pub async fn heal_all(&self) {
        self.network.heal_all().await;
    }

    /// Make `name` the only active algorithm on every node.
    pub fn switch_all(&self, name: &str) -> Result<()> {
        for node in &self.nodes {
            node.switch_to(name)?;
        }
        Ok(())
    }

    pub async fn digests(&self) -> Result<Vec<StoreDigest>> {
        let mut digests = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            digests.push(node.digest().await?);
        }
        Ok(digests)
    }

    /// Whether every node holds the same `(uid, version)` set.
    pub async fn is_converged(&self) -> Result<bool> {
        let digests = self.digests().await?;
        Ok(digests.windows(2).all(|pair| pair[0] == pair[1]))
    }

    /// Poll until converged or `timeout` passes.
    pub async fn wait_converged(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_converged().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Poll until every node holds `uid` at `version` or later.
    pub async fn wait_for_version(
        &self,
        uid: &MessageUid,
        version: u32,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut all = true;
            for node in &self.nodes {
                let held = node.store().get_by_id(uid).await?.map(|m| m.version());
                if held.map_or(true, |v| v < version) {
                    all = false;
                    break;
                }
            }
            if all {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }
}
