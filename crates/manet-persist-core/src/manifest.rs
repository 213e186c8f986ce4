//! Manifests and request sets.
//!
//! A manifest advertises which `(uid, version)` pairs a node holds. A request
//! set has the same shape but asks peers for anything newer than the stated
//! versions. Both are tagged with the name of the algorithm that produced
//! them so several strategies can share one bus.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::message::ApplicationMessage;
use crate::types::MessageUid;
use crate::wire::limits;

/// Lightweight reference to a message: identity and version, no payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub uid: MessageUid,
    pub version: u32,
}

impl ManifestEntry {
    pub fn new(uid: MessageUid, version: u32) -> Self {
        Self { uid, version }
    }
}

/// Batch advertisement of `(uid, version)` pairs.
///
/// Entries are unique by uid; version is compared separately by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageManifest {
    algorithm: String,
    entries: Vec<ManifestEntry>,
}

impl MessageManifest {
    /// Create an empty manifest for an algorithm.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            entries: Vec::new(),
        }
    }

    /// Build a manifest advertising every message in `messages`.
    ///
    /// Later duplicates of a uid are dropped.
    pub fn from_messages<'a>(
        algorithm: impl Into<String>,
        messages: impl IntoIterator<Item = &'a ApplicationMessage>,
    ) -> Self {
        let mut seen = HashSet::new();
        let entries = messages
            .into_iter()
            .filter(|m| seen.insert(m.uid.clone()))
            .map(ApplicationMessage::entry)
            .collect();
        Self {
            algorithm: algorithm.into(),
            entries,
        }
    }

    pub fn algorithm_name(&self) -> &str {
        &self.algorithm
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry. Returns `false` (and leaves the manifest unchanged)
    /// if the uid is already present.
    pub fn push(&mut self, entry: ManifestEntry) -> bool {
        if self.contains(&entry.uid) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Membership by uid alone.
    pub fn contains(&self, uid: &MessageUid) -> bool {
        self.get(uid).is_some()
    }

    pub fn get(&self, uid: &MessageUid) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| &e.uid == uid)
    }

    /// Split into manifests of at most `max_entries` entries each, in order.
    ///
    /// Every fragment carries the same algorithm name. An empty manifest
    /// yields no fragments; `max_entries` of zero is treated as one.
    pub fn fragment(&self, max_entries: usize) -> Vec<MessageManifest> {
        self.entries
            .chunks(max_entries.max(1))
            .map(|chunk| MessageManifest {
                algorithm: self.algorithm.clone(),
                entries: chunk.to_vec(),
            })
            .collect()
    }

    /// Check a decoded manifest: named, within limits, unique by uid.
    pub fn validate(&self) -> Result<()> {
        if self.algorithm.is_empty() {
            return Err(CoreError::MissingAlgorithm);
        }
        if self.entries.len() > limits::MAX_MANIFEST_ENTRIES {
            return Err(CoreError::LimitExceeded("too many manifest entries"));
        }
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(&entry.uid) {
                return Err(CoreError::DuplicateEntry(entry.uid.clone()));
            }
        }
        Ok(())
    }
}

/// Request for newer copies of the listed uids.
///
/// Each entry means "send me this uid if you hold a version greater than
/// the one stated".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequests(MessageManifest);

impl MessageRequests {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self(MessageManifest::new(algorithm))
    }

    pub fn algorithm_name(&self) -> &str {
        self.0.algorithm_name()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        self.0.entries()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entry: ManifestEntry) -> bool {
        self.0.push(entry)
    }

    pub fn fragment(&self, max_entries: usize) -> Vec<MessageRequests> {
        self.0
            .fragment(max_entries)
            .into_iter()
            .map(MessageRequests)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}
