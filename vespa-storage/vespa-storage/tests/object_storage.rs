// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_storage::{ObjectStorage, ObjectStorageOptions, StorableObject, StorableObjectFlags, StorageBackend};
use vespa_storage_memory::MemoryBackend;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Barrier,
    },
    time::Duration,
};

struct Counter {
    flags: StorableObjectFlags,
    key: Vec<u8>,
    value: AtomicU64,
}

impl Counter {
    fn new(key: &[u8], value: u64) -> Self {
        Self {
            flags: StorableObjectFlags::default(),
            key: key.to_vec(),
            value: AtomicU64::new(value),
        }
    }
}

impl StorableObject for Counter {
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error> {
        let value = if bytes.is_empty() {
            0
        } else {
            u64::from_le_bytes(
                bytes
                    .try_into()
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid counter"))?,
            )
        };

        Ok(Self::new(key, value))
    }

    fn object_key(&self) -> Vec<u8> {
        self.key.clone()
    }

    fn object_bytes(&self) -> Vec<u8> {
        self.value.load(Ordering::SeqCst).to_le_bytes().to_vec()
    }

    fn is_modified(&self) -> bool {
        self.flags.is_modified()
    }

    fn set_modified(&self, modified: bool) {
        self.flags.set_modified(modified);
    }
}

fn storage_with(backend: Arc<MemoryBackend>, cache_time: Duration) -> ObjectStorage<Counter> {
    ObjectStorage::new(backend, ObjectStorageOptions::new(0, cache_time))
}

#[test]
fn single_identity_per_key() {
    let storage = storage_with(Arc::new(MemoryBackend::new()), Duration::from_secs(10));

    let (a, was_new) = storage.store_if_absent(Counter::new(b"key", 1));
    assert!(was_new);

    let b = storage.load(b"key").unwrap();

    // A mutation through one handle is immediately visible through the other.
    a.value.store(7, Ordering::SeqCst);
    assert_eq!(b.value.load(Ordering::SeqCst), 7);

    a.release(false);
    b.release(false);
}

#[test]
fn concurrent_store_if_absent_resolves_to_one_object() {
    let storage = Arc::new(storage_with(Arc::new(MemoryBackend::new()), Duration::from_secs(10)));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = storage.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let (cached, was_new) = storage.store_if_absent(Counter::new(b"shared", i));
                let value = cached.value.load(Ordering::SeqCst);
                cached.release(false);
                (was_new, value)
            })
        })
        .collect();

    let results: Vec<(bool, u64)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|(was_new, _)| *was_new).count(), 1);
    // Everyone observed the same winning object.
    assert_eq!(results.iter().map(|(_, v)| v).collect::<std::collections::HashSet<_>>().len(), 1);
    assert_eq!(storage.live_handles(), 0);
}

#[test]
fn release_discipline_leaves_no_live_handles() {
    let storage = storage_with(Arc::new(MemoryBackend::new()), Duration::from_secs(10));

    let (a, _) = storage.store_if_absent(Counter::new(b"key", 1));
    let b = a.retain();
    let c = storage.load(b"key").unwrap();

    assert_eq!(storage.live_handles(), 3);

    a.release(false);
    b.release(false);
    drop(c);

    assert_eq!(storage.live_handles(), 0);
    storage.shutdown();
}

#[test]
fn persisted_on_release_and_reloadable() {
    let backend = Arc::new(MemoryBackend::new());

    {
        let storage = storage_with(backend.clone(), Duration::from_millis(0));
        let (cached, _) = storage.store_if_absent(Counter::new(b"key", 42));
        cached.release(true);
        storage.shutdown();
    }

    // Same backend, fresh cache: the object must come back byte-identical.
    let storage = storage_with(backend.clone(), Duration::from_secs(10));
    let cached = storage.load(b"key").unwrap();

    assert_eq!(cached.value.load(Ordering::SeqCst), 42);
    cached.release(true);
}

#[test]
fn modified_objects_are_persisted_on_release() {
    let backend = Arc::new(MemoryBackend::new());
    let storage = storage_with(backend.clone(), Duration::from_millis(0));

    let (cached, _) = storage.store_if_absent(Counter::new(b"key", 1));
    cached.release(true);

    let cached = storage.load(b"key").unwrap();
    cached.value.store(9, Ordering::SeqCst);
    cached.set_modified();
    cached.release(true);

    assert_eq!(
        backend.fetch(&[0u8, b'k', b'e', b'y']).unwrap(),
        Some(9u64.to_le_bytes().to_vec())
    );
}

#[test]
fn force_release_evicts_immediately() {
    let storage = storage_with(Arc::new(MemoryBackend::new()), Duration::from_secs(3600));

    let (cached, _) = storage.store_if_absent(Counter::new(b"key", 1));
    cached.release(true);

    assert_eq!(storage.size(), 0);
}

#[test]
fn normal_release_keeps_entry_until_ttl() {
    let storage = storage_with(Arc::new(MemoryBackend::new()), Duration::from_secs(3600));

    let (cached, _) = storage.store_if_absent(Counter::new(b"key", 1));
    cached.release(false);

    assert_eq!(storage.size(), 1);
}

#[test]
fn for_each_unions_cache_and_backend() {
    let backend = Arc::new(MemoryBackend::new());

    // One object only persisted, one only cached, one in both.
    backend.insert(&[0u8, b'p'], &1u64.to_le_bytes()).unwrap();
    backend.insert(&[0u8, b'b'], &2u64.to_le_bytes()).unwrap();

    let storage = storage_with(backend, Duration::from_secs(3600));

    let cached = storage.load(b"b").unwrap();
    let (fresh, _) = storage.store_if_absent(Counter::new(b"c", 3));

    let mut keys = Vec::new();
    storage.for_each(|key, _| {
        keys.push(key.to_vec());
        true
    });
    keys.sort();

    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"p".to_vec()]);

    cached.release(false);
    fresh.release(false);
}

#[test]
fn delete_removes_from_cache_and_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let storage = storage_with(backend.clone(), Duration::from_secs(3600));

    let (cached, _) = storage.store_if_absent(Counter::new(b"key", 1));
    cached.release(false);
    storage.flush().unwrap();

    storage.delete(b"key");

    assert!(!storage.contains(b"key"));
    assert!(backend.is_empty());
}
