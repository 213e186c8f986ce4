//! Convergence verification.
//!
//! Two nodes have converged when they hold the same set of `(uid, version)`
//! pairs. Payloads are not compared: a version identifies its payload.

use std::collections::BTreeMap;
use std::fmt;

use manet_persist_core::{ManifestEntry, MessageUid};
use manet_persist_store::MessageStore;

use crate::error::Result;

/// Deterministic digest of a store's `(uid, version)` set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreDigest(pub [u8; 32]);

impl StoreDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StoreDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StoreDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hash_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// Compute the digest of everything currently stored.
///
/// Algorithm:
/// 1. Read all messages (ordered by uid)
/// 2. For each: hash length-prefixed uid fields, then the version
/// 3. Return the final hash
///
/// Placeholders count: a node holding only a stub has not converged.
pub async fn compute_store_digest<S: MessageStore + ?Sized>(store: &S) -> Result<StoreDigest> {
    let mut messages = store.get_all().await?;
    messages.sort_by(|a, b| a.uid().cmp(b.uid()));

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"manet-persist-digest-v0:");

    for stored in &messages {
        let uid = stored.uid();
        hash_field(&mut hasher, &uid.origin_engine);
        hash_field(&mut hasher, &uid.origin_client);
        hash_field(&mut hasher, &uid.local_id);
        hasher.update(&stored.version().to_le_bytes());
    }

    Ok(StoreDigest(*hasher.finalize().as_bytes()))
}

/// Result of comparing local state with a remote manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both sides hold the same versions.
    Converged,
    /// The sides differ (more rounds may fix it).
    Diverged {
        /// Uids the remote has and we lack.
        missing_locally: Vec<MessageUid>,
        /// Uids we have and the remote lacks.
        missing_remotely: Vec<MessageUid>,
        /// Uids held at different versions: `(uid, local, remote)`.
        version_mismatch: Vec<(MessageUid, u32, u32)>,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare the local store with a full remote manifest.
pub async fn compare_with_manifest<S: MessageStore + ?Sized>(
    store: &S,
    remote: &[ManifestEntry],
) -> Result<ConvergenceResult> {
    let local: BTreeMap<MessageUid, u32> = store
        .get_all()
        .await?
        .into_iter()
        .map(|s| (s.message.uid, s.message.version))
        .collect();
    let remote: BTreeMap<&MessageUid, u32> = remote.iter().map(|e| (&e.uid, e.version)).collect();

    let mut missing_locally = Vec::new();
    let mut version_mismatch = Vec::new();
    for (uid, &remote_version) in &remote {
        match local.get(*uid) {
            None => missing_locally.push((*uid).clone()),
            Some(&v) if v != remote_version => {
                version_mismatch.push(((*uid).clone(), v, remote_version))
            }
            Some(_) => {}
        }
    }

    let missing_remotely: Vec<MessageUid> = local
        .keys()
        .filter(|uid| !remote.contains_key(uid))
        .cloned()
        .collect();

    if missing_locally.is_empty() && missing_remotely.is_empty() && version_mismatch.is_empty() {
        return Ok(ConvergenceResult::Converged);
    }

    Ok(ConvergenceResult::Diverged {
        missing_locally,
        missing_remotely,
        version_mismatch,
    })
}
