// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Options of the consumer-leak detector of an object storage.
#[derive(Clone, Debug)]
pub struct LeakDetectionOptions {
    /// Number of simultaneous consumers of one object above which acquire
    /// call sites are reported.
    pub max_consumers_per_object: usize,
    /// Duration a handle may be held before its acquire call site is
    /// reported.
    pub max_consumer_hold_time: Duration,
}

/// Options of an [`ObjectStorage`](crate::ObjectStorage).
#[derive(Clone, Debug)]
pub struct ObjectStorageOptions {
    /// Realm prefix byte, prepended to every key in the backend.
    pub prefix: u8,
    /// How long released objects stay resident in the cache.
    pub cache_time: Duration,
    /// Whether objects are written to the backend at all.
    pub persistence_enabled: bool,
    /// Whether only keys are persisted, with empty values.
    pub keys_only: bool,
    /// Whether new objects are persisted immediately on creation instead of
    /// on release.
    pub store_on_create: bool,
    /// Consumer-leak detection; `None` disables it.
    pub leak_detection: Option<LeakDetectionOptions>,
}

impl ObjectStorageOptions {
    /// Creates options for the given realm prefix with persistence enabled
    /// and everything else off.
    pub fn new(prefix: u8, cache_time: Duration) -> Self {
        Self {
            prefix,
            cache_time,
            persistence_enabled: true,
            keys_only: false,
            store_on_create: false,
            leak_detection: None,
        }
    }

    /// Sets the keys-only mode.
    pub fn with_keys_only(mut self, keys_only: bool) -> Self {
        self.keys_only = keys_only;
        self
    }

    /// Sets whether objects are persisted on creation.
    pub fn with_store_on_create(mut self, store_on_create: bool) -> Self {
        self.store_on_create = store_on_create;
        self
    }

    /// Sets whether objects are persisted at all.
    pub fn with_persistence(mut self, persistence_enabled: bool) -> Self {
        self.persistence_enabled = persistence_enabled;
        self
    }

    /// Enables leak detection.
    pub fn with_leak_detection(mut self, options: LeakDetectionOptions) -> Self {
        self.leak_detection = Some(options);
        self
    }
}
