//! Algorithm lifecycle.
//!
//! An algorithm is a periodic step plus a handler for its own manifests and
//! requests. [`AlgorithmHandle`] owns the task that drives the step and the
//! activation switch that gates both the loop and the handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use manet_persist_core::{
    MessageManifest, MessageRequests, MessageUid, NodeId, PersistEvent, StoredMessage,
    TransportProperties,
};
use manet_persist_store::{MessageStore, PutResult, StoreExt};

use crate::bus::EventBus;
use crate::error::{Result, SyncError};

/// A replication strategy.
///
/// Implementations keep their mutable state behind their own locks: `step`
/// runs on the algorithm task while the handlers run on the bus dispatch
/// task, possibly at the same time.
#[async_trait]
pub trait PersistenceAlgorithm: Send + Sync + 'static {
    /// Tag carried by every manifest and request this algorithm publishes.
    fn name(&self) -> &'static str;

    /// Pause between two steps.
    fn interval(&self) -> Duration;

    /// One epoch of work.
    async fn step(&self) -> Result<()>;

    /// React to a manifest published by another node.
    async fn handle_manifest(&self, source: &NodeId, manifest: &MessageManifest) -> Result<()>;

    /// React to requests published by another node.
    async fn handle_requests(&self, source: &NodeId, requests: &MessageRequests) -> Result<()>;
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Store and bus shared by an algorithm, with bounded store access.
pub struct AlgorithmContext<S: ?Sized, B: ?Sized> {
    pub store: Arc<S>,
    pub bus: Arc<B>,
    pub query_timeout: Duration,
}

impl<S: ?Sized, B: ?Sized> Clone for AlgorithmContext<S, B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            query_timeout: self.query_timeout,
        }
    }
}

impl<S, B> AlgorithmContext<S, B>
where
    S: MessageStore + ?Sized,
    B: EventBus + ?Sized,
{
    pub fn new(store: Arc<S>, bus: Arc<B>, query_timeout: Duration) -> Self {
        Self {
            store,
            bus,
            query_timeout,
        }
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = manet_persist_store::Result<T>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout(what.to_string())),
        }
    }

    /// Look up one message.
    pub async fn query(&self, uid: &MessageUid) -> Result<Option<StoredMessage>> {
        self.bounded("message lookup", self.store.get_by_id(uid)).await
    }

    /// Purge expired messages and return what is left.
    pub async fn snapshot(&self) -> Result<Vec<StoredMessage>> {
        self.bounded("store snapshot", self.store.live_snapshot(unix_now()))
            .await
    }

    /// Store a placeholder unless the uid is already known.
    pub async fn put_placeholder(&self, uid: &MessageUid) -> Result<PutResult> {
        self.bounded("placeholder write", self.store.put_placeholder(uid))
            .await
    }

    /// Publish a stored message again on the channel it was first sent on.
    ///
    /// Placeholders have no channel and are never published.
    pub async fn republish(&self, stored: &StoredMessage) -> Result<bool> {
        let Some(destination) = stored.destination.as_deref() else {
            return Ok(false);
        };
        self.bus
            .publish(
                destination,
                stored.properties,
                PersistEvent::Message(stored.message.clone()),
            )
            .await?;
        Ok(true)
    }

    /// Publish a manifest split into fragments of at most `max_entries`.
    pub async fn publish_manifest(
        &self,
        destination: &str,
        reliable: bool,
        manifest: &MessageManifest,
        max_entries: usize,
    ) -> Result<usize> {
        let fragments = manifest.fragment(max_entries);
        let count = fragments.len();
        for fragment in fragments {
            self.bus
                .publish(destination, TransportProperties::control(reliable), fragment.into())
                .await?;
        }
        Ok(count)
    }

    /// Publish requests split into fragments of at most `max_entries`.
    pub async fn publish_requests(
        &self,
        destination: &str,
        reliable: bool,
        requests: &MessageRequests,
        max_entries: usize,
    ) -> Result<usize> {
        let fragments = requests.fragment(max_entries);
        let count = fragments.len();
        for fragment in fragments {
            self.bus
                .publish(destination, TransportProperties::control(reliable), fragment.into())
                .await?;
        }
        Ok(count)
    }
}

/// Running algorithm with an activation switch.
///
/// The task is spawned inactive. Dropping the handle stops it.
pub struct AlgorithmHandle {
    algorithm: Arc<dyn PersistenceAlgorithm>,
    local: NodeId,
    active: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AlgorithmHandle {
    /// Spawn the algorithm loop on the current runtime.
    pub fn spawn(algorithm: Arc<dyn PersistenceAlgorithm>, local: NodeId) -> Self {
        let (active, rx) = watch::channel(false);
        let task = tokio::spawn(run(Arc::clone(&algorithm), rx));
        Self {
            algorithm,
            local,
            active,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Start stepping. Returns false if already active.
    pub fn activate(&self) -> bool {
        let changed = self.active.send_if_modified(|active| !std::mem::replace(active, true));
        if changed {
            tracing::info!(algorithm = self.name(), "algorithm activated");
        }
        changed
    }

    /// Stop stepping. Returns false if already inactive.
    ///
    /// Does not wait for a step that is already running.
    pub fn deactivate(&self) -> bool {
        let changed = self.active.send_if_modified(|active| std::mem::replace(active, false));
        if changed {
            tracing::info!(algorithm = self.name(), "algorithm deactivated");
        }
        changed
    }

    /// Run one step outside the loop.
    pub async fn step(&self) -> Result<()> {
        self.algorithm.step().await
    }

    /// Route a bus event to the algorithm.
    ///
    /// Returns whether the algorithm handled it. Events are dropped while
    /// inactive, and so are our own broadcasts, plain messages, events
    /// tagged for another algorithm, and empty manifests.
    pub async fn handle_event(&self, source: &NodeId, event: &PersistEvent) -> Result<bool> {
        if !self.is_active() || source == &self.local {
            return Ok(false);
        }

        let Some(tag) = event.algorithm_name() else {
            return Ok(false);
        };
        if tag != self.name() {
            tracing::trace!(algorithm = self.name(), tag, "ignoring foreign event");
            return Ok(false);
        }

        match event {
            PersistEvent::Manifest(manifest) if manifest.is_empty() => {
                tracing::debug!(algorithm = self.name(), source = %source, "ignoring empty manifest");
                Ok(false)
            }
            PersistEvent::Requests(requests) if requests.is_empty() => {
                tracing::debug!(algorithm = self.name(), source = %source, "ignoring empty requests");
                Ok(false)
            }
            PersistEvent::Manifest(manifest) => {
                self.algorithm.handle_manifest(source, manifest).await?;
                Ok(true)
            }
            PersistEvent::Requests(requests) => {
                self.algorithm.handle_requests(source, requests).await?;
                Ok(true)
            }
            PersistEvent::Message(_) => Ok(false),
        }
    }

    /// Stop the loop permanently.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for AlgorithmHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(algorithm: Arc<dyn PersistenceAlgorithm>, mut active: watch::Receiver<bool>) {
    let name = algorithm.name();
    loop {
        if active.wait_for(|on| *on).await.is_err() {
            return;
        }

        let started = Instant::now();
        if let Err(e) = algorithm.step().await {
            tracing::warn!(algorithm = name, error = %e, "step failed");
        }

        let interval = algorithm.interval();
        let elapsed = started.elapsed();
        if elapsed > interval {
            tracing::warn!(
                algorithm = name,
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "step overran its interval"
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = active.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use manet_persist_core::{ManifestEntry, MessageUid};

    #[derive(Default)]
    struct Counting {
        steps: AtomicUsize,
        manifests: AtomicUsize,
        requests: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PersistenceAlgorithm for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(100)
        }

        async fn step(&self) -> Result<()> {
            self.steps.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SyncError::Timeout("test".into()));
            }
            Ok(())
        }

        async fn handle_manifest(&self, _: &NodeId, _: &MessageManifest) -> Result<()> {
            self.manifests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn handle_requests(&self, _: &NodeId, _: &MessageRequests) -> Result<()> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manifest(name: &str) -> PersistEvent {
        let mut m = MessageManifest::new(name);
        m.push(ManifestEntry::new(MessageUid::new("E1", "C1", "m1"), 1));
        m.into()
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_only_while_active() {
        let algo = Arc::new(Counting::default());
        let handle = AlgorithmHandle::spawn(algo.clone(), NodeId::from("local"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(algo.steps.load(Ordering::SeqCst), 0);

        assert!(handle.activate());
        assert!(!handle.activate());
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(algo.steps.load(Ordering::SeqCst), 4);

        assert!(handle.deactivate());
        assert!(!handle.deactivate());
        tokio::task::yield_now().await;
        let frozen = algo.steps.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(algo.steps.load(Ordering::SeqCst), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_step_keeps_looping() {
        let algo = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let handle = AlgorithmHandle::spawn(algo.clone(), NodeId::from("local"));
        handle.activate();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(algo.steps.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_event_filtering() {
        let algo = Arc::new(Counting::default());
        let handle = AlgorithmHandle::spawn(algo.clone(), NodeId::from("local"));
        let peer = NodeId::from("peer");

        // Inactive: dropped.
        assert!(!handle.handle_event(&peer, &manifest("counting")).await.unwrap());

        handle.activate();
        assert!(handle.handle_event(&peer, &manifest("counting")).await.unwrap());
        assert!(!handle
            .handle_event(&NodeId::from("local"), &manifest("counting"))
            .await
            .unwrap());
        assert!(!handle.handle_event(&peer, &manifest("other")).await.unwrap());
        assert!(!handle
            .handle_event(&peer, &MessageManifest::new("counting").into())
            .await
            .unwrap());

        let mut requests = MessageRequests::new("counting");
        requests.push(ManifestEntry::new(MessageUid::new("E1", "C1", "m1"), 0));
        assert!(handle.handle_event(&peer, &requests.into()).await.unwrap());

        assert_eq!(algo.manifests.load(Ordering::SeqCst), 1);
        assert_eq!(algo.requests.load(Ordering::SeqCst), 1);
    }
}
