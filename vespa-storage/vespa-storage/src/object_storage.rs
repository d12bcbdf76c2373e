// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! A TTL cache with explicit reference-counted handles in front of a storage
//! backend realm.

use crate::{backend, cached::CachedObject, options::ObjectStorageOptions, StorageBackend};

use dashmap::{mapref::entry::Entry, DashMap};
use log::warn;

use std::{
    collections::HashSet,
    panic::Location,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

/// Modification state embedded in every storable object.
///
/// Objects embed these flags and delegate the trait accessors to them; the
/// store consumes the marker when it persists the object on release.
#[derive(Default)]
pub struct StorableObjectFlags {
    modified: AtomicBool,
}

impl StorableObjectFlags {
    /// Sets or clears the modified marker.
    pub fn set_modified(&self, modified: bool) {
        self.modified.store(modified, Ordering::SeqCst);
    }

    /// Whether the object has unpersisted mutations.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }
}

/// A typed value of an object storage realm.
///
/// The factory contract is strict: bytes that fail to decode indicate a
/// corrupted store and abort the process.
pub trait StorableObject: Send + Sync + Sized + 'static {
    /// Reconstructs an object from its key and persisted bytes. For keys-only
    /// realms the bytes are empty and the key carries all information.
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error>;

    /// The key this object is stored under, without the realm prefix.
    fn object_key(&self) -> Vec<u8>;

    /// The persisted representation of this object.
    fn object_bytes(&self) -> Vec<u8>;

    /// Whether the object has mutations that still need to be persisted.
    fn is_modified(&self) -> bool;

    /// Sets or clears the modified marker.
    fn set_modified(&self, modified: bool);
}

pub(crate) struct CacheEntry<T> {
    pub(crate) key: Vec<u8>,
    pub(crate) object: T,
    pub(crate) ref_count: AtomicUsize,
    released_at: Mutex<Instant>,
    consumers: Mutex<Vec<(&'static Location<'static>, Instant)>>,
}

impl<T> CacheEntry<T> {
    fn new(key: Vec<u8>, object: T) -> Self {
        Self {
            key,
            object,
            ref_count: AtomicUsize::new(1),
            released_at: Mutex::new(Instant::now()),
            consumers: Mutex::new(Vec::new()),
        }
    }
}

pub(crate) struct Inner<T: StorableObject> {
    backend: Arc<dyn StorageBackend>,
    options: ObjectStorageOptions,
    entries: DashMap<Vec<u8>, Arc<CacheEntry<T>>>,
}

impl<T: StorableObject> Inner<T> {
    fn prefixed(&self, key: &[u8]) -> Vec<u8> {
        let mut prefixed = Vec::with_capacity(1 + key.len());
        prefixed.push(self.options.prefix);
        prefixed.extend_from_slice(key);
        prefixed
    }

    fn decode(&self, key: &[u8], bytes: &[u8]) -> T {
        T::from_key_and_bytes(key, bytes).unwrap_or_else(|e| {
            panic!(
                "Object storage realm {} is corrupted: undecodable object under key {:02x?}: {}",
                self.options.prefix, key, e
            )
        })
    }

    fn persist(&self, entry: &CacheEntry<T>) -> Result<(), backend::Error> {
        if !self.options.persistence_enabled {
            return Ok(());
        }

        let value = if self.options.keys_only {
            Vec::new()
        } else {
            entry.object.object_bytes()
        };

        self.backend.insert(&self.prefixed(&entry.key), &value)
    }

    /// Increments the reference count of an entry. The caller must guarantee
    /// that the entry is either reachable through the map guard or already
    /// retained, so the count cannot concurrently drop to zero and be evicted.
    pub(crate) fn acquire(&self, entry: &Arc<CacheEntry<T>>, location: &'static Location<'static>) -> Arc<CacheEntry<T>> {
        entry.ref_count.fetch_add(1, Ordering::SeqCst);
        self.track_consumer(entry, location);
        entry.clone()
    }

    fn track_consumer(&self, entry: &CacheEntry<T>, location: &'static Location<'static>) {
        if let Some(leak) = &self.options.leak_detection {
            let mut consumers = entry.consumers.lock().unwrap();
            consumers.push((location, Instant::now()));
            if consumers.len() > leak.max_consumers_per_object {
                warn!(
                    "Object under key {:02x?} has {} simultaneous consumers; acquire sites: {:?}",
                    entry.key,
                    consumers.len(),
                    consumers.iter().map(|(l, _)| l.to_string()).collect::<Vec<_>>()
                );
            }
        }
    }

    pub(crate) fn release_entry(&self, entry: &Arc<CacheEntry<T>>, force: bool) {
        if self.options.leak_detection.is_some() {
            let mut consumers = entry.consumers.lock().unwrap();
            if !consumers.is_empty() {
                consumers.remove(0);
            }
        }

        let previous = entry.ref_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0);

        if previous == 1 {
            if entry.object.is_modified() {
                match self.persist(entry) {
                    Ok(()) => entry.object.set_modified(false),
                    // Left modified so the write is retried on the next
                    // release or flush.
                    Err(e) => warn!("Persisting object under key {:02x?} failed: {}", entry.key, e),
                }
            }

            if force {
                self.entries
                    .remove_if(&entry.key, |_, e| Arc::ptr_eq(e, entry) && e.ref_count.load(Ordering::SeqCst) == 0);
            } else {
                *entry.released_at.lock().unwrap() = Instant::now();
            }
        }
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();

        for entry in self.entries.iter() {
            if entry.ref_count.load(Ordering::SeqCst) == 0
                && now.duration_since(*entry.released_at.lock().unwrap()) >= self.options.cache_time
            {
                expired.push(entry.key().clone());
            }

            if let Some(leak) = &self.options.leak_detection {
                for (location, since) in entry.consumers.lock().unwrap().iter() {
                    if now.duration_since(*since) > leak.max_consumer_hold_time {
                        warn!(
                            "Object under key {:02x?} held since {:?} by consumer acquired at {}",
                            entry.key,
                            since,
                            location
                        );
                    }
                }
            }
        }

        for key in expired {
            let mut persisted = true;

            if let Some(entry) = self.entries.get(&key) {
                if entry.object.is_modified() {
                    match self.persist(&entry) {
                        Ok(()) => entry.object.set_modified(false),
                        Err(e) => {
                            persisted = false;
                            warn!("Persisting object under key {:02x?} failed: {}", key, e);
                        }
                    }
                }
            }

            if persisted {
                self.entries.remove_if(&key, |_, e| {
                    e.ref_count.load(Ordering::SeqCst) == 0 && !e.object.is_modified()
                });
            }
        }
    }
}

/// A typed object store: a persistent backend realm fronted by a TTL cache
/// whose entries are kept live by explicit acquire/release reference counts.
///
/// At any instant there is at most one live object per key; concurrent loads
/// return handles to the same object and mutations through one handle are
/// immediately visible through all others.
pub struct ObjectStorage<T: StorableObject> {
    inner: Arc<Inner<T>>,
}

impl<T: StorableObject> Clone for ObjectStorage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StorableObject> ObjectStorage<T> {
    /// Creates an object storage over a realm of the given backend.
    pub fn new(backend: Arc<dyn StorageBackend>, options: ObjectStorageOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                options,
                entries: DashMap::new(),
            }),
        }
    }

    /// Loads the object under the given key, incrementing its reference
    /// count. Returns `None` if the key is neither cached nor persisted.
    #[track_caller]
    pub fn load(&self, key: &[u8]) -> Option<CachedObject<T>> {
        let location = Location::caller();

        self.inner.evict_expired();

        if let Some(entry) = self.inner.entries.get(key) {
            let entry = self.inner.acquire(entry.value(), location);
            return Some(CachedObject::new(self.inner.clone(), entry));
        }

        let prefixed = self.inner.prefixed(key);
        let bytes = self
            .inner
            .backend
            .fetch(&prefixed)
            .unwrap_or_else(|e| panic!("Fetching key {:02x?} failed: {}", key, e))?;

        let entry = match self.inner.entries.entry(key.to_vec()) {
            // Someone else finished loading first; their object wins.
            Entry::Occupied(occupied) => self.inner.acquire(occupied.get(), location),
            Entry::Vacant(vacant) => {
                let object = self.inner.decode(key, &bytes);
                let entry = Arc::new(CacheEntry::new(key.to_vec(), object));
                self.inner.track_consumer(&entry, location);
                vacant.insert(entry.clone());
                entry
            }
        };

        Some(CachedObject::new(self.inner.clone(), entry))
    }

    /// Stores the object if no object exists under its key yet. Returns a
    /// handle and whether the object was newly stored. Both callers of a
    /// concurrent race receive handles to the same object.
    #[track_caller]
    pub fn store_if_absent(&self, object: T) -> (CachedObject<T>, bool) {
        let location = Location::caller();

        self.inner.evict_expired();

        let key = object.object_key();

        let (entry, was_new) = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => (self.inner.acquire(occupied.get(), location), false),
            Entry::Vacant(vacant) => {
                let prefixed = self.inner.prefixed(&key);
                let persisted = self
                    .inner
                    .backend
                    .fetch(&prefixed)
                    .unwrap_or_else(|e| panic!("Fetching key {:02x?} failed: {}", key, e));

                match persisted {
                    Some(bytes) => {
                        let object = self.inner.decode(&key, &bytes);
                        let entry = Arc::new(CacheEntry::new(key.clone(), object));
                        self.inner.track_consumer(&entry, location);
                        vacant.insert(entry.clone());
                        (entry, false)
                    }
                    None => {
                        object.set_modified(true);
                        let entry = Arc::new(CacheEntry::new(key.clone(), object));
                        self.inner.track_consumer(&entry, location);

                        if self.inner.options.store_on_create {
                            match self.inner.persist(&entry) {
                                Ok(()) => entry.object.set_modified(false),
                                Err(e) => warn!("Persisting key {:02x?} on creation failed: {}", key, e),
                            }
                        }

                        vacant.insert(entry.clone());
                        (entry, true)
                    }
                }
            }
        };

        (CachedObject::new(self.inner.clone(), entry), was_new)
    }

    /// Whether an object exists under the key, cached or persisted.
    pub fn contains(&self, key: &[u8]) -> bool {
        if self.inner.entries.contains_key(key) {
            return true;
        }

        self.inner
            .backend
            .contains(&self.inner.prefixed(key))
            .unwrap_or_else(|e| panic!("Checking key {:02x?} failed: {}", key, e))
    }

    /// Visits every object of the realm, cached or persisted, de-duplicated
    /// by key, until the visitor returns `false`.
    pub fn for_each(&self, mut visitor: impl FnMut(&[u8], &T) -> bool) {
        let mut visited = HashSet::new();

        let cached: Vec<Arc<CacheEntry<T>>> = self.inner.entries.iter().map(|e| e.value().clone()).collect();

        for entry in cached {
            visited.insert(entry.key.clone());
            if !visitor(&entry.key, &entry.object) {
                return;
            }
        }

        let mut keep_going = true;

        self.inner
            .backend
            .iter_prefix(&[self.inner.options.prefix], &mut |key, bytes| {
                let key = &key[1..];
                if visited.contains(key) {
                    return true;
                }
                let object = self.inner.decode(key, bytes);
                keep_going = visitor(key, &object);
                keep_going
            })
            .unwrap_or_else(|e| panic!("Iterating realm {} failed: {}", self.inner.options.prefix, e));
    }

    /// Visits every key of the realm, cached or persisted, de-duplicated,
    /// until the visitor returns `false`. Objects are not decoded.
    pub fn for_each_key_only(&self, mut visitor: impl FnMut(&[u8]) -> bool) {
        let mut visited = HashSet::new();

        let cached: Vec<Vec<u8>> = self.inner.entries.iter().map(|e| e.key().clone()).collect();

        for key in cached {
            visited.insert(key.clone());
            if !visitor(&key) {
                return;
            }
        }

        self.inner
            .backend
            .iter_prefix(&[self.inner.options.prefix], &mut |key, _| {
                let key = &key[1..];
                if visited.contains(key) {
                    return true;
                }
                visitor(key)
            })
            .unwrap_or_else(|e| panic!("Iterating realm {} failed: {}", self.inner.options.prefix, e));
    }

    /// Deletes the object under the key from cache and backend.
    pub fn delete(&self, key: &[u8]) {
        self.inner.entries.remove(key);

        if let Err(e) = self.inner.backend.delete(&self.inner.prefixed(key)) {
            warn!("Deleting key {:02x?} failed: {}", key, e);
        }
    }

    /// Persists every modified object. Returns the first error encountered.
    pub fn flush(&self) -> Result<(), backend::Error> {
        let mut first_error = None;

        for entry in self.inner.entries.iter() {
            if entry.object.is_modified() {
                match self.inner.persist(&entry) {
                    Ok(()) => entry.object.set_modified(false),
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => self.inner.backend.flush(),
        }
    }

    /// Blocks until all handles are released, reports the ones that never
    /// were, and flushes.
    pub fn shutdown(&self) {
        for _ in 0..100 {
            if !self
                .inner
                .entries
                .iter()
                .any(|e| e.ref_count.load(Ordering::SeqCst) > 0)
            {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        for entry in self.inner.entries.iter() {
            let count = entry.ref_count.load(Ordering::SeqCst);
            if count > 0 {
                warn!(
                    "Object under key {:02x?} still has {} consumers at shutdown; acquire sites: {:?}",
                    entry.key,
                    count,
                    entry
                        .consumers
                        .lock()
                        .unwrap()
                        .iter()
                        .map(|(l, _)| l.to_string())
                        .collect::<Vec<_>>()
                );
            }
        }

        if let Err(e) = self.flush() {
            warn!("Flushing realm {} at shutdown failed: {}", self.inner.options.prefix, e);
        }
    }

    /// Number of leaked handles at this instant; zero when the release
    /// discipline was honored.
    pub fn live_handles(&self) -> usize {
        self.inner
            .entries
            .iter()
            .map(|e| e.ref_count.load(Ordering::SeqCst))
            .sum()
    }

    /// Number of objects currently resident in the cache.
    pub fn size(&self) -> usize {
        self.inner.entries.len()
    }
}
