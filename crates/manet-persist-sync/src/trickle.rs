//! Trickle algorithm.
//!
//! Each message gets its own Trickle timer. While neighbours agree the
//! timer backs off exponentially and redundant adverts are suppressed; any
//! disagreement makes that message chatty again.
//!
//! Per interval of length `tau`:
//!
//! - the timer fires at a random point in `[tau/2, tau]`;
//! - every consistent advert heard for the message bumps a counter `c`;
//! - at expiry the entry is advertised only if `c < k`, then `c` resets and
//!   `tau` doubles up to `tau_high`.
//!
//! A peer behind us gets the full message pushed and our timer drops back to
//! `tau_low`. A peer ahead of us makes our timer fire on the next scan, so
//! our stale advert provokes the push.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::time::Instant;

use manet_persist_core::{MessageManifest, MessageRequests, MessageUid, NodeId, StoredMessage};
use manet_persist_store::MessageStore;

use crate::algorithm::{AlgorithmContext, PersistenceAlgorithm};
use crate::bus::EventBus;
use crate::config::TrickleConfig;
use crate::error::Result;

/// Tag carried by Trickle adverts.
pub const ALGORITHM_NAME: &str = "trickle";

/// Trickle state for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrickleTimer {
    c: u32,
    k: u32,
    tau: Duration,
    tau_low: Duration,
    tau_high: Duration,
    next_check: Instant,
}

impl TrickleTimer {
    /// Start a timer halfway between `tau_low` and `tau_high`.
    pub fn new<R: Rng>(
        k: u32,
        tau_low: Duration,
        tau_high: Duration,
        now: Instant,
        rng: &mut R,
    ) -> Self {
        let mut timer = Self {
            c: 0,
            k,
            tau: tau_low + (tau_high.saturating_sub(tau_low)) / 2,
            tau_low,
            tau_high,
            next_check: now,
        };
        timer.schedule(now, rng);
        timer
    }

    fn schedule<R: Rng>(&mut self, now: Instant, rng: &mut R) {
        let half = self.tau / 2;
        self.next_check = now + half + half.mul_f64(rng.gen::<f64>());
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_check
    }

    /// Count a consistent advert heard in the current interval.
    pub fn heard(&mut self) {
        self.c = self.c.saturating_add(1);
    }

    pub fn should_transmit(&self) -> bool {
        self.c < self.k
    }

    /// End the current interval.
    ///
    /// Returns whether the entry should be advertised, then starts a new
    /// interval of double length.
    pub fn expire<R: Rng>(&mut self, now: Instant, rng: &mut R) -> bool {
        let transmit = self.should_transmit();
        self.c = 0;
        self.tau = (self.tau * 2).min(self.tau_high);
        self.schedule(now, rng);
        transmit
    }

    /// Drop back to the shortest interval.
    pub fn reset<R: Rng>(&mut self, now: Instant, rng: &mut R) {
        self.tau = self.tau_low;
        self.c = 0;
        self.schedule(now, rng);
    }

    /// Make the timer due immediately with a clean counter.
    pub fn fire_now(&mut self, now: Instant) {
        self.next_check = now;
        self.c = 0;
    }

    pub fn c(&self) -> u32 {
        self.c
    }

    pub fn tau(&self) -> Duration {
        self.tau
    }

    pub fn next_check(&self) -> Instant {
        self.next_check
    }
}

struct TrickleState {
    timers: HashMap<MessageUid, TrickleTimer>,
    rng: StdRng,
}

enum TimerAction {
    Fire,
    Reset,
    Heard,
}

/// Trickle-based anti-entropy.
pub struct TrickleAlgorithm<S: ?Sized, B: ?Sized> {
    ctx: AlgorithmContext<S, B>,
    config: TrickleConfig,
    state: Mutex<TrickleState>,
}

impl<S, B> TrickleAlgorithm<S, B>
where
    S: MessageStore + ?Sized,
    B: EventBus + ?Sized,
{
    pub const NAME: &'static str = ALGORITHM_NAME;

    pub fn new(ctx: AlgorithmContext<S, B>, config: TrickleConfig) -> Self {
        Self::with_rng(ctx, config, StdRng::from_entropy())
    }

    /// Deterministic timer jitter, for simulations.
    pub fn with_seed(ctx: AlgorithmContext<S, B>, config: TrickleConfig, seed: u64) -> Self {
        Self::with_rng(ctx, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ctx: AlgorithmContext<S, B>, config: TrickleConfig, rng: StdRng) -> Self {
        Self {
            ctx,
            config,
            state: Mutex::new(TrickleState {
                timers: HashMap::new(),
                rng,
            }),
        }
    }

    pub fn config(&self) -> &TrickleConfig {
        &self.config
    }

    /// Current timer for a uid, if one exists.
    pub async fn timer(&self, uid: &MessageUid) -> Option<TrickleTimer> {
        self.state.lock().await.timers.get(uid).copied()
    }

    fn new_timer(&self, now: Instant, rng: &mut StdRng) -> TrickleTimer {
        TrickleTimer::new(
            self.config.k,
            self.config.tau_low(),
            self.config.tau_high(),
            now,
            rng,
        )
    }

    async fn push_current(&self, uid: &MessageUid) {
        match self.ctx.query(uid).await {
            Ok(Some(current)) => {
                if let Err(e) = self.ctx.republish(&current).await {
                    tracing::warn!(algorithm = Self::NAME, uid = %uid, error = %e, "push failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(algorithm = Self::NAME, uid = %uid, error = %e, "skipping push");
            }
        }
    }
}

#[async_trait]
impl<S, B> PersistenceAlgorithm for TrickleAlgorithm<S, B>
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
        let now = Instant::now();
        let mut manifest = MessageManifest::new(Self::NAME);
        let mut suppressed = 0usize;

        {
            let mut guard = self.state.lock().await;
            let TrickleState { timers, rng } = &mut *guard;

            // Expired messages take their timers with them.
            let live: HashSet<&MessageUid> = snapshot.iter().map(StoredMessage::uid).collect();
            timers.retain(|uid, _| live.contains(uid));

            for stored in &snapshot {
                let timer = timers
                    .entry(stored.uid().clone())
                    .or_insert_with(|| self.new_timer(now, rng));
                if !timer.is_due(now) {
                    continue;
                }
                if timer.expire(now, rng) {
                    manifest.push(stored.message.entry());
                } else {
                    suppressed += 1;
                }
            }
        }

        if manifest.is_empty() {
            if suppressed > 0 {
                tracing::trace!(algorithm = Self::NAME, suppressed, "all due adverts suppressed");
            }
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
            suppressed,
            fragments,
            "published trickle adverts"
        );
        Ok(())
    }

    async fn handle_manifest(&self, source: &NodeId, manifest: &MessageManifest) -> Result<()> {
        let snapshot = self.ctx.snapshot().await?;
        let local: HashMap<&MessageUid, u32> = snapshot
            .iter()
            .map(|s| (s.uid(), s.version()))
            .collect();

        let mut actions = Vec::with_capacity(manifest.len());
        for entry in manifest.entries() {
            match local.get(&entry.uid).copied() {
                None if entry.version > 0 => {
                    if let Err(e) = self.ctx.put_placeholder(&entry.uid).await {
                        tracing::warn!(algorithm = Self::NAME, uid = %entry.uid, error = %e, "placeholder not stored");
                        continue;
                    }
                    actions.push((entry.uid.clone(), TimerAction::Fire));
                }
                None => {}
                Some(version) if version < entry.version => {
                    actions.push((entry.uid.clone(), TimerAction::Fire));
                }
                Some(version) if version > entry.version => {
                    self.push_current(&entry.uid).await;
                    actions.push((entry.uid.clone(), TimerAction::Reset));
                }
                Some(_) => actions.push((entry.uid.clone(), TimerAction::Heard)),
            }
        }

        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let TrickleState { timers, rng } = &mut *guard;
        for (uid, action) in actions {
            let timer = timers
                .entry(uid)
                .or_insert_with(|| self.new_timer(now, rng));
            match action {
                TimerAction::Fire => timer.fire_now(now),
                TimerAction::Reset => timer.reset(now, rng),
                TimerAction::Heard => timer.heard(),
            }
        }

        tracing::trace!(
            algorithm = Self::NAME,
            source = %source,
            entries = manifest.len(),
            "processed trickle advert"
        );
        Ok(())
    }

    async fn handle_requests(&self, source: &NodeId, _requests: &MessageRequests) -> Result<()> {
        tracing::trace!(algorithm = Self::NAME, source = %source, "trickle does not use requests");
        Ok(())
    }
}
