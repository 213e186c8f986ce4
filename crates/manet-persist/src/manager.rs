//! Algorithm registry and switching.

use std::collections::BTreeMap;
use std::sync::Arc;

use manet_persist_core::{NodeId, PersistEvent};
use manet_persist_sync::{
    AlgorithmHandle, PersistenceAlgorithm, MANIFEST_ALGORITHM, TRICKLE_ALGORITHM,
};

use crate::error::{EngineError, Result};

/// Coarse estimate of how many neighbours a node has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkDensity {
    /// Many neighbours: redundant adverts are common, so Trickle pays off.
    Dense,
    /// Few neighbours: full manifests are cheap and converge fastest.
    Sparse,
}

impl NetworkDensity {
    pub fn preferred_algorithm(&self) -> &'static str {
        match self {
            NetworkDensity::Dense => TRICKLE_ALGORITHM,
            NetworkDensity::Sparse => MANIFEST_ALGORITHM,
        }
    }
}

/// Owns the running algorithms of one node.
///
/// Every registered algorithm has its own task; only active ones step or
/// handle events.
pub struct PersistenceManager {
    local: NodeId,
    algorithms: BTreeMap<&'static str, AlgorithmHandle>,
}

impl PersistenceManager {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            algorithms: BTreeMap::new(),
        }
    }

    /// Spawn an algorithm, inactive. Replaces any algorithm of the same name.
    pub fn register(&mut self, algorithm: Arc<dyn PersistenceAlgorithm>) {
        let name = algorithm.name();
        let handle = AlgorithmHandle::spawn(algorithm, self.local.clone());
        if let Some(previous) = self.algorithms.insert(name, handle) {
            previous.shutdown();
            tracing::debug!(algorithm = name, "replaced algorithm");
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.algorithms.keys().copied().collect()
    }

    pub fn get(&self, name: &str) -> Option<&AlgorithmHandle> {
        self.algorithms.get(name)
    }

    fn handle(&self, name: &str) -> Result<&AlgorithmHandle> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownAlgorithm(name.to_string()))
    }

    /// Names of the algorithms currently active.
    pub fn active(&self) -> Vec<&'static str> {
        self.algorithms
            .iter()
            .filter(|(_, handle)| handle.is_active())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Returns false if the algorithm was already active.
    pub fn activate(&self, name: &str) -> Result<bool> {
        Ok(self.handle(name)?.activate())
    }

    /// Returns false if the algorithm was already inactive.
    pub fn deactivate(&self, name: &str) -> Result<bool> {
        Ok(self.handle(name)?.deactivate())
    }

    /// Make `name` the only active algorithm.
    pub fn switch_to(&self, name: &str) -> Result<()> {
        let target = self.handle(name)?;
        for (other, handle) in &self.algorithms {
            if *other != name {
                handle.deactivate();
            }
        }
        if target.activate() {
            tracing::info!(algorithm = name, "switched persistence algorithm");
        }
        Ok(())
    }

    /// Switch to the algorithm suited to `density`.
    pub fn apply_density(&self, density: NetworkDensity) -> Result<()> {
        self.switch_to(density.preferred_algorithm())
    }

    /// Offer an event to every algorithm. Returns how many handled it.
    ///
    /// Handler failures are logged; they never stop delivery to the others.
    pub async fn handle_event(&self, source: &NodeId, event: &PersistEvent) -> usize {
        let mut handled = 0;
        for (name, handle) in &self.algorithms {
            match handle.handle_event(source, event).await {
                Ok(true) => handled += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(algorithm = *name, source = %source, error = %e, "event handler failed");
                }
            }
        }
        handled
    }

    /// Stop every algorithm task.
    pub fn shutdown(&self) {
        for handle in self.algorithms.values() {
            handle.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use manet_persist_store::MemoryStore;
    use manet_persist_sync::{
        AlgorithmContext, ManifestAlgorithm, ManifestConfig, MemoryNetwork, TrickleAlgorithm,
        TrickleConfig,
    };

    async fn manager() -> PersistenceManager {
        let network = MemoryNetwork::new();
        let bus = Arc::new(network.attach(NodeId::from("local")).await);
        let store = Arc::new(MemoryStore::new());
        let ctx = AlgorithmContext::new(store, bus, Duration::from_secs(1));

        let mut manager = PersistenceManager::new(NodeId::from("local"));
        manager.register(Arc::new(ManifestAlgorithm::new(ctx.clone(), ManifestConfig::default())));
        manager.register(Arc::new(TrickleAlgorithm::new(ctx, TrickleConfig::default())));
        manager
    }

    #[tokio::test]
    async fn test_registry() {
        let manager = manager().await;
        assert_eq!(manager.names(), vec!["manifest", "trickle"]);
        assert!(manager.active().is_empty());

        assert!(manager.activate("manifest").unwrap());
        assert!(!manager.activate("manifest").unwrap());
        assert_eq!(manager.active(), vec!["manifest"]);

        assert!(matches!(
            manager.activate("gossip"),
            Err(EngineError::UnknownAlgorithm(_))
        ));
    }

    #[tokio::test]
    async fn test_density_switching() {
        let manager = manager().await;
        manager.activate("manifest").unwrap();

        manager.apply_density(NetworkDensity::Dense).unwrap();
        assert_eq!(manager.active(), vec!["trickle"]);

        manager.apply_density(NetworkDensity::Sparse).unwrap();
        assert_eq!(manager.active(), vec!["manifest"]);

        assert!(manager.switch_to("gossip").is_err());
        assert_eq!(manager.active(), vec!["manifest"]);
    }

    #[tokio::test]
    async fn test_events_reach_active_algorithm_only() {
        let manager = manager().await;
        manager.activate("trickle").unwrap();

        let mut advert = manet_persist_core::MessageManifest::new("manifest");
        advert.push(manet_persist_core::ManifestEntry::new(
            manet_persist_core::MessageUid::new("E1", "C1", "m1"),
            1,
        ));
        let event: PersistEvent = advert.into();

        assert_eq!(manager.handle_event(&NodeId::from("peer"), &event).await, 0);
        manager.activate("manifest").unwrap();
        assert_eq!(manager.handle_event(&NodeId::from("peer"), &event).await, 1);
    }
}
