//! Manifest algorithm.
//!
//! Every epoch each node broadcasts the version of every message it holds.
//! A node hearing a manifest compares entry by entry: it pushes what it has
//! newer, and requests what it has older or not at all.

use std::time::Duration;

use async_trait::async_trait;

use manet_persist_core::{ManifestEntry, MessageManifest, MessageRequests, NodeId};
use manet_persist_store::MessageStore;

use crate::algorithm::{AlgorithmContext, PersistenceAlgorithm};
use crate::bus::EventBus;
use crate::config::ManifestConfig;
use crate::error::Result;

/// Tag carried by manifest-algorithm manifests and requests.
pub const ALGORITHM_NAME: &str = "manifest";

/// Full-manifest anti-entropy.
pub struct ManifestAlgorithm<S: ?Sized, B: ?Sized> {
    ctx: AlgorithmContext<S, B>,
    config: ManifestConfig,
}

impl<S, B> ManifestAlgorithm<S, B>
where
    S: MessageStore + ?Sized,
    B: EventBus + ?Sized,
{
    pub const NAME: &'static str = ALGORITHM_NAME;

    pub fn new(ctx: AlgorithmContext<S, B>, config: ManifestConfig) -> Self {
        Self { ctx, config }
    }

    pub fn config(&self) -> &ManifestConfig {
        &self.config
    }
}

#[async_trait]
impl<S, B> PersistenceAlgorithm for ManifestAlgorithm<S, B>
where
    S: MessageStore + ?Sized + 'static,
    B: EventBus + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn interval(&self) -> Duration {
        self.config.interval()
    }

    async fn step(&self) -> Result<()> {
        let snapshot = self.ctx.snapshot().await?;
        let manifest = MessageManifest::from_messages(Self::NAME, snapshot.iter().map(|s| &s.message));
        if manifest.is_empty() {
            tracing::trace!(algorithm = Self::NAME, "nothing to advertise");
            return Ok(());
        }

        let fragments = self
            .ctx
            .publish_manifest(
                &self.config.destination,
                self.config.reliable,
                &manifest,
                self.config.manifest_length,
            )
            .await?;
        tracing::debug!(
            algorithm = Self::NAME,
            entries = manifest.len(),
            fragments,
            "published manifest"
        );
        Ok(())
    }

    async fn handle_manifest(&self, source: &NodeId, manifest: &MessageManifest) -> Result<()> {
        let mut requests = MessageRequests::new(Self::NAME);
        let mut pushed = 0usize;

        for entry in manifest.entries() {
            let local = match self.ctx.query(&entry.uid).await {
                Ok(local) => local,
                Err(e) => {
                    tracing::warn!(algorithm = Self::NAME, uid = %entry.uid, error = %e, "skipping entry");
                    continue;
                }
            };

            match local {
                Some(local) if local.version() > entry.version => match self.ctx.republish(&local).await {
                    Ok(true) => pushed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(algorithm = Self::NAME, uid = %entry.uid, error = %e, "push failed");
                    }
                },
                Some(local) if local.version() < entry.version => {
                    requests.push(ManifestEntry::new(entry.uid.clone(), local.version()));
                }
                Some(_) => {}
                None => {
                    requests.push(ManifestEntry::new(entry.uid.clone(), 0));
                    if let Err(e) = self.ctx.put_placeholder(&entry.uid).await {
                        tracing::warn!(algorithm = Self::NAME, uid = %entry.uid, error = %e, "placeholder not stored");
                    }
                }
            }
        }

        if !requests.is_empty() {
            self.ctx
                .publish_requests(
                    &self.config.destination,
                    self.config.reliable,
                    &requests,
                    self.config.manifest_length,
                )
                .await?;
        }

        tracing::debug!(
            algorithm = Self::NAME,
            source = %source,
            entries = manifest.len(),
            pushed,
            requested = requests.len(),
            "reconciled manifest"
        );
        Ok(())
    }

    async fn handle_requests(&self, source: &NodeId, requests: &MessageRequests) -> Result<()> {
        let mut pushed = 0usize;

        for entry in requests.entries() {
            match self.ctx.query(&entry.uid).await {
                Ok(Some(local)) if local.version() > entry.version => match self.ctx.republish(&local).await {
                    Ok(true) => pushed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(algorithm = Self::NAME, uid = %entry.uid, error = %e, "push failed");
                    }
                },
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(algorithm = Self::NAME, uid = %entry.uid, error = %e, "skipping request");
                }
            }
        }

        tracing::debug!(algorithm = Self::NAME, source = %source, pushed, "answered requests");
        Ok(())
    }
}
