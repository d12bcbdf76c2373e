// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::object_storage::{CacheEntry, Inner, StorableObject};

use std::{ops::Deref, panic::Location, sync::Arc};

/// A reference-counted handle to a cached object.
///
/// Holding a handle keeps the object live and confers mutation rights subject
/// to the object's own synchronization. Every handle must be released;
/// dropping one performs a normal release, `release(true)` drops the cache
/// entry to zero immediately instead of waiting for the TTL.
pub struct CachedObject<T: StorableObject> {
    inner: Arc<Inner<T>>,
    entry: Arc<CacheEntry<T>>,
    released: bool,
}

impl<T: StorableObject> CachedObject<T> {
    pub(crate) fn new(inner: Arc<Inner<T>>, entry: Arc<CacheEntry<T>>) -> Self {
        Self {
            inner,
            entry,
            released: false,
        }
    }

    /// The key of the underlying object.
    pub fn key(&self) -> &[u8] {
        &self.entry.key
    }

    /// Acquires another handle to the same object.
    #[track_caller]
    pub fn retain(&self) -> Self {
        let entry = self.inner.acquire(&self.entry, Location::caller());
        Self {
            inner: self.inner.clone(),
            entry,
            released: false,
        }
    }

    /// Marks the object as modified so it is persisted on release.
    pub fn set_modified(&self) {
        self.entry.object.set_modified(true);
    }

    /// Releases the handle. With `force` the object is evicted as soon as the
    /// last handle is gone instead of staying resident until the cache TTL.
    pub fn release(mut self, force: bool) {
        self.released = true;
        self.inner.release_entry(&self.entry, force);
    }
}

impl<T: StorableObject> Deref for CachedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.entry.object
    }
}

impl<T: StorableObject> Drop for CachedObject<T> {
    fn drop(&mut self) {
        if !self.released {
            self.inner.release_entry(&self.entry, false);
        }
    }
}
