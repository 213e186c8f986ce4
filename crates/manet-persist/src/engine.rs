//! The Engine: one node's persistence layer.
//!
//! The Engine ties a store, a bus, and the persistence algorithms together.
//! Producers submit messages through it; a dispatch task feeds everything
//! the bus delivers either into the store (messages) or to the algorithms
//! (manifests and requests).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use manet_persist_core::{
    limits, ApplicationMessage, CoreError, ManifestEntry, MessageUid, NodeId, PersistEvent,
    StoredMessage, TransportProperties,
};
use manet_persist_store::{MessageStore, PutResult};
use manet_persist_sync::{
    compute_store_digest, unix_now, AlgorithmContext, Envelope, EventBus, ManifestAlgorithm,
    StoreDigest, TrickleAlgorithm,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::manager::{NetworkDensity, PersistenceManager};

/// A running persistence node.
///
/// Generic over the store and the bus so the same engine runs on SQLite in
/// production and on memory in simulations.
pub struct Engine<S: MessageStore + 'static, B: EventBus + 'static> {
    node_id: NodeId,
    store: Arc<S>,
    bus: Arc<B>,
    config: EngineConfig,
    manager: Arc<PersistenceManager>,
    /// Held from version lookup to store write, so one uid never gets the
    /// same version twice.
    submit_lock: Mutex<()>,
    dispatch: JoinHandle<()>,
}

impl<S: MessageStore + 'static, B: EventBus + 'static> Engine<S, B> {
    /// Start the engine on the current runtime.
    ///
    /// Registers both algorithms, activates the configured default and
    /// starts consuming the bus.
    pub fn start(store: S, bus: B, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let node_id = bus.local_node_id().clone();
        let store = Arc::new(store);
        let bus = Arc::new(bus);
        let ctx = AlgorithmContext::new(Arc::clone(&store), Arc::clone(&bus), config.query_timeout());

        let mut manager = PersistenceManager::new(node_id.clone());
        manager.register(Arc::new(ManifestAlgorithm::new(ctx.clone(), config.manifest.clone())));
        manager.register(Arc::new(TrickleAlgorithm::new(ctx, config.trickle.clone())));
        manager.activate(&config.default_algorithm)?;
        let manager = Arc::new(manager);

        let dispatch = tokio::spawn(dispatch_loop(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&manager),
            config.query_timeout(),
        ));

        tracing::info!(node = %node_id, algorithm = %config.default_algorithm, "engine started");

        Ok(Self {
            node_id,
            store,
            bus,
            config,
            manager,
            submit_lock: Mutex::new(()),
            dispatch,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &PersistenceManager {
        &self.manager
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Producer Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish a message from a local client.
    ///
    /// Persistent messages take their version from the store: one past the
    /// stored version, or 1 if the uid is new. If the store cannot answer in
    /// time the submission fails rather than guess. Non-persistent messages
    /// are always version 1 and never stored.
    pub async fn submit(
        &self,
        client: &str,
        local_id: &str,
        destination: &str,
        properties: TransportProperties,
        payload: impl Into<Bytes>,
    ) -> Result<ApplicationMessage> {
        let payload = payload.into();
        if payload.len() > limits::MAX_PAYLOAD_BYTES {
            return Err(CoreError::LimitExceeded("payload too large").into());
        }

        let uid = MessageUid::new(self.node_id.as_str(), client, local_id);
        let persistent = properties.is_persistent();

        let message = if persistent {
            let _guard = self.submit_lock.lock().await;
            let version = match self.bounded(&uid, self.store.get_by_id(&uid)).await? {
                Some(existing) => existing.version().saturating_add(1),
                None => 1,
            };

            let message = ApplicationMessage::new(uid, version, payload);
            let stored = StoredMessage::new(destination, properties, message.clone());
            if let PutResult::Stale { existing } = self.bounded(&message.uid, self.store.put(&stored)).await? {
                return Err(EngineError::VersionConflict {
                    uid: message.uid.to_string(),
                    version,
                    existing,
                });
            }
            message
        } else {
            ApplicationMessage::new(uid, 1, payload)
        };

        self.bus
            .publish(destination, properties, PersistEvent::Message(message.clone()))
            .await?;

        tracing::debug!(
            uid = %message.uid,
            version = message.version,
            persistent,
            destination,
            "submitted message"
        );
        Ok(message)
    }

    async fn bounded<T, F>(&self, uid: &MessageUid, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = manet_persist_store::Result<T>>,
    {
        match tokio::time::timeout(self.config.query_timeout(), fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::StoreTimeout(uid.to_string())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Algorithm Control
    // ─────────────────────────────────────────────────────────────────────────

    pub fn activate(&self, name: &str) -> Result<bool> {
        self.manager.activate(name)
    }

    pub fn deactivate(&self, name: &str) -> Result<bool> {
        self.manager.deactivate(name)
    }

    pub fn switch_to(&self, name: &str) -> Result<()> {
        self.manager.switch_to(name)
    }

    /// Pick the algorithm for the observed neighbourhood.
    pub fn set_density(&self, density: NetworkDensity) -> Result<()> {
        self.manager.apply_density(density)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Version of every stored message, ordered by uid.
    pub async fn entries(&self) -> Result<Vec<ManifestEntry>> {
        let all = self.store.get_all().await?;
        Ok(all.iter().map(|s| s.message.entry()).collect())
    }

    /// Digest of the stored `(uid, version)` set.
    pub async fn digest(&self) -> Result<StoreDigest> {
        Ok(compute_store_digest(self.store.as_ref()).await?)
    }

    /// Stop the dispatch task and every algorithm.
    pub fn shutdown(&self) {
        self.dispatch.abort();
        self.manager.shutdown();
        tracing::info!(node = %self.node_id, "engine stopped");
    }
}

impl<S: MessageStore + 'static, B: EventBus + 'static> Drop for Engine<S, B> {
    fn drop(&mut self) {
        self.dispatch.abort();
        self.manager.shutdown();
    }
}

async fn dispatch_loop<S: MessageStore, B: EventBus>(
    store: Arc<S>,
    bus: Arc<B>,
    manager: Arc<PersistenceManager>,
    query_timeout: Duration,
) {
    let local = bus.local_node_id().clone();
    loop {
        let envelope = match bus.recv().await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(node = %local, error = %e, "bus closed, dispatch stopping");
                return;
            }
        };

        if envelope.source == local {
            continue;
        }

        if matches!(envelope.event, PersistEvent::Message(_)) {
            merge_message(store.as_ref(), envelope, query_timeout).await;
        } else {
            manager.handle_event(&envelope.source, &envelope.event).await;
        }
    }
}

/// Install a message heard from a peer if it is persistent, live, and newer.
async fn merge_message<S: MessageStore + ?Sized>(store: &S, envelope: Envelope, query_timeout: Duration) {
    let Envelope {
        source,
        destination,
        properties,
        event,
    } = envelope;
    let PersistEvent::Message(message) = event else {
        return;
    };

    if !properties.is_persistent() || properties.is_expired(unix_now()) {
        tracing::trace!(uid = %message.uid, "not persisting transient message");
        return;
    }

    let stored = StoredMessage::new(destination, properties, message);
    match tokio::time::timeout(query_timeout, store.put(&stored)).await {
        Ok(Ok(PutResult::Inserted)) | Ok(Ok(PutResult::Updated { .. })) => {
            tracing::debug!(
                source = %source,
                uid = %stored.uid(),
                version = stored.version(),
                "merged message"
            );
        }
        Ok(Ok(PutResult::Stale { existing })) => {
            tracing::trace!(uid = %stored.uid(), existing, "ignoring stale message");
        }
        Ok(Err(e)) => {
            tracing::warn!(uid = %stored.uid(), error = %e, "failed to merge message");
        }
        Err(_) => {
            tracing::warn!(uid = %stored.uid(), "store timed out merging message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use manet_persist_store::MemoryStore;
    use manet_persist_sync::{ManifestConfig, MemoryBus, MemoryNetwork};

    const FOREVER: TransportProperties = TransportProperties::new(false, -1, false);

    async fn engine(network: &Arc<MemoryNetwork>, id: &str) -> Engine<MemoryStore, MemoryBus> {
        let bus = network.attach(NodeId::from(id)).await;
        Engine::start(MemoryStore::new(), bus, EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_producer_versions() {
        let network = MemoryNetwork::new();
        let a = engine(&network, "E1").await;

        let first = a.submit("C1", "m1", "chat", FOREVER, "hello").await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.uid, MessageUid::new("E1", "C1", "m1"));

        let second = a.submit("C1", "m1", "chat", FOREVER, "hello v2").await.unwrap();
        assert_eq!(second.version, 2);

        let stored = a.store().get_by_id(&first.uid).await.unwrap().unwrap();
        assert_eq!(stored.version(), 2);
        assert_eq!(stored.message.payload.as_ref(), b"hello v2");
        assert_eq!(stored.destination.as_deref(), Some("chat"));
    }

    #[tokio::test]
    async fn test_transient_messages_are_not_stored() {
        let network = MemoryNetwork::new();
        let a = engine(&network, "E1").await;

        let props = TransportProperties::new(true, 0, false);
        assert_eq!(a.submit("C1", "t", "chat", props, "x").await.unwrap().version, 1);
        assert_eq!(a.submit("C1", "t", "chat", props, "y").await.unwrap().version, 1);
        assert_eq!(a.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let network = MemoryNetwork::new();
        let a = engine(&network, "E1").await;

        let payload = vec![0u8; limits::MAX_PAYLOAD_BYTES + 1];
        let err = a.submit("C1", "big", "chat", FOREVER, payload).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::LimitExceeded(_))));
    }

    #[tokio::test]
    async fn test_peer_messages_merge_by_version() {
        let network = MemoryNetwork::new();
        let a = engine(&network, "E1").await;
        let b = engine(&network, "E2").await;

        a.submit("C1", "m1", "chat", FOREVER, "hello").await.unwrap();
        a.submit("C1", "m1", "chat", FOREVER, "hello v2").await.unwrap();
        a.submit("C1", "t", "chat", TransportProperties::default(), "gone").await.unwrap();

        let uid = MessageUid::new("E1", "C1", "m1");
        for _ in 0..100 {
            if let Some(m) = b.store().get_by_id(&uid).await.unwrap() {
                if m.version() == 2 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let got = b.store().get_by_id(&uid).await.unwrap().unwrap();
        assert_eq!(got.version(), 2);
        assert_eq!(got.message.payload.as_ref(), b"hello v2");
        assert!(b
            .store()
            .get_by_id(&MessageUid::new("E1", "C1", "t"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_default_algorithm_active() {
        let network = MemoryNetwork::new();
        let a = engine(&network, "E1").await;
        assert_eq!(a.manager().active(), vec!["manifest"]);

        a.set_density(NetworkDensity::Dense).unwrap();
        assert_eq!(a.manager().active(), vec!["trickle"]);
        assert!(a.switch_to("flooding").is_err());
    }

    /// Store whose lookups never complete.
    struct StalledStore;

    #[async_trait]
    impl MessageStore for StalledStore {
        async fn get_all(&self) -> manet_persist_store::Result<Vec<StoredMessage>> {
            Ok(Vec::new())
        }

        async fn get_by_id(&self, _: &MessageUid) -> manet_persist_store::Result<Option<StoredMessage>> {
            std::future::pending().await
        }

        async fn put(&self, _: &StoredMessage) -> manet_persist_store::Result<PutResult> {
            std::future::pending().await
        }

        async fn purge_expired(&self, _: i64) -> manet_persist_store::Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> manet_persist_store::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_fails_submission() {
        let network = MemoryNetwork::new();
        let bus = network.attach(NodeId::from("E1")).await;
        let config = EngineConfig::default()
            .with_store_query_timeout_ms(100)
            .with_manifest(ManifestConfig::default().with_sleep_ms(10_000));
        let a = Engine::start(StalledStore, bus, config).unwrap();
        let watcher = network.attach(NodeId::from("watcher")).await;

        let err = a.submit("C1", "m1", "chat", FOREVER, "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::StoreTimeout(ref uid) if uid == "E1/C1/m1"));

        // Nothing was published for the failed submission.
        assert!(watcher.recv_timeout(Duration::from_millis(50)).await.unwrap().is_none());

        // Transient submissions never touch the store.
        let props = TransportProperties::default();
        assert_eq!(a.submit("C1", "t", "chat", props, "x").await.unwrap().version, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_get_distinct_versions() {
        let network = MemoryNetwork::new();
        let bus = network.attach(NodeId::from("E1")).await;
        let store = manet_persist_store::SqliteStore::open_memory().unwrap();
        let a = Engine::start(store, bus, EngineConfig::default()).unwrap();

        for round in 0..50 {
            let id = format!("m{round}");
            let (first, second) = tokio::join!(
                a.submit("C1", &id, "chat", FOREVER, "A"),
                a.submit("C1", &id, "chat", FOREVER, "B"),
            );
            let (first, second) = (first.unwrap(), second.unwrap());

            let mut versions = [first.version, second.version];
            versions.sort_unstable();
            assert_eq!(versions, [1, 2], "round {round}");

            let latest = if first.version == 2 { &first } else { &second };
            let stored = a.store().get_by_id(&latest.uid).await.unwrap().unwrap();
            assert_eq!(stored.version(), 2);
            assert_eq!(stored.message.payload, latest.payload);
        }
    }

    /// Store whose reads lag behind a writer it cannot see.
    struct LaggingStore;

    #[async_trait]
    impl MessageStore for LaggingStore {
        async fn get_all(&self) -> manet_persist_store::Result<Vec<StoredMessage>> {
            Ok(Vec::new())
        }

        async fn get_by_id(&self, _: &MessageUid) -> manet_persist_store::Result<Option<StoredMessage>> {
            Ok(None)
        }

        async fn put(&self, _: &StoredMessage) -> manet_persist_store::Result<PutResult> {
            Ok(PutResult::Stale { existing: 3 })
        }

        async fn purge_expired(&self, _: i64) -> manet_persist_store::Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> manet_persist_store::Result<usize> {
            Ok(1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_write_is_not_published() {
        let network = MemoryNetwork::new();
        let bus = network.attach(NodeId::from("E1")).await;
        let config = EngineConfig::default().with_manifest(ManifestConfig::default().with_sleep_ms(10_000));
        let a = Engine::start(LaggingStore, bus, config).unwrap();
        let watcher = network.attach(NodeId::from("watcher")).await;

        let err = a.submit("C1", "m1", "chat", FOREVER, "hello").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::VersionConflict { version: 1, existing: 3, .. }
        ));
        assert!(watcher.recv_timeout(Duration::from_millis(50)).await.unwrap().is_none());
    }

    proptest::proptest! {
        #[test]
        fn test_versions_count_persistent_submissions(
            kinds in proptest::collection::vec(proptest::bool::ANY, 1..20)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let versions = rt.block_on(async {
                let network = MemoryNetwork::new();
                let a = engine(&network, "E1").await;
                let mut versions = Vec::new();
                for persistent in &kinds {
                    let props = if *persistent { FOREVER } else { TransportProperties::default() };
                    versions.push(a.submit("C1", "m", "chat", props, "x").await.unwrap().version);
                }
                versions
            });

            let mut stored = 0u32;
            for (persistent, version) in kinds.iter().zip(versions) {
                if *persistent {
                    stored += 1;
                    proptest::prop_assert_eq!(version, stored);
                } else {
                    proptest::prop_assert_eq!(version, 1);
                }
            }
        }
    }
}
