//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use manet_persist_core::{
    ApplicationMessage, ManifestEntry, MessageManifest, MessageUid, StoredMessage,
    TransportProperties,
};

/// Generate a uid from a small id space, so collisions actually happen.
pub fn message_uid() -> impl Strategy<Value = MessageUid> {
    (0u8..4, 0u8..4, "[a-z0-9]{1,6}").prop_map(|(engine, client, id)| {
        MessageUid::new(format!("E{engine}"), format!("C{client}"), id)
    })
}

/// Generate a version, placeholders included.
pub fn version() -> impl Strategy<Value = u32> {
    0u32..=64
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate persistence properties: forever, until some time, or transient.
pub fn transport_properties() -> impl Strategy<Value = TransportProperties> {
    (
        any::<bool>(),
        prop_oneof![Just(-1i64), Just(0i64), 1i64..=4_000_000_000i64],
        any::<bool>(),
    )
        .prop_map(|(reliable, until, ordered)| TransportProperties::new(reliable, until, ordered))
}

pub fn application_message() -> impl Strategy<Value = ApplicationMessage> {
    (message_uid(), version(), payload(64))
        .prop_map(|(uid, version, payload)| ApplicationMessage::new(uid, version, payload))
}

/// Generate a stored message that never expires.
pub fn stored_message() -> impl Strategy<Value = StoredMessage> {
    application_message().prop_map(|message| {
        StoredMessage::new("chat", TransportProperties::new(false, -1, false), message)
    })
}

/// Generate up to `max` entries with distinct uids.
pub fn manifest_entries(max: usize) -> impl Strategy<Value = Vec<ManifestEntry>> {
    prop::collection::btree_map(message_uid(), version(), 0..=max).prop_map(
        |entries: BTreeMap<MessageUid, u32>| {
            entries
                .into_iter()
                .map(|(uid, version)| ManifestEntry::new(uid, version))
                .collect()
        },
    )
}

/// Generate a manifest tagged with `algorithm`.
pub fn manifest(algorithm: &'static str, max: usize) -> impl Strategy<Value = MessageManifest> {
    manifest_entries(max).prop_map(move |entries| {
        let mut manifest = MessageManifest::new(algorithm);
        for entry in entries {
            manifest.push(entry);
        }
        manifest
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manet_persist_core::PersistEvent;
    use manet_persist_store::{MemoryStore, MessageStore, StoreExt};
    use manet_persist_sync::compute_store_digest;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    proptest! {
        #[test]
        fn test_generated_manifests_are_valid(m in manifest("manifest", 200)) {
            prop_assert!(m.validate().is_ok());
            let event: PersistEvent = m.into();
            prop_assert!(event.validate().is_ok());
        }

        #[test]
        fn test_placeholder_never_clobbers(msg in stored_message()) {
            let kept = block_on(async {
                let store = MemoryStore::new();
                store.put(&msg).await.unwrap();
                for _ in 0..3 {
                    store.put_placeholder(msg.uid()).await.unwrap();
                }
                store.get_by_id(msg.uid()).await.unwrap().unwrap()
            });
            prop_assert_eq!(kept, msg);
        }

        #[test]
        fn test_digest_independent_of_arrival_order(
            messages in prop::collection::vec(stored_message(), 0..40)
        ) {
            let (forward, backward) = block_on(async {
                let a = MemoryStore::new();
                let b = MemoryStore::new();
                for m in &messages {
                    a.put(m).await.unwrap();
                }
                for m in messages.iter().rev() {
                    b.put(m).await.unwrap();
                }
                (
                    compute_store_digest(&a).await.unwrap(),
                    compute_store_digest(&b).await.unwrap(),
                )
            });
            prop_assert_eq!(forward, backward);
        }
    }
}
