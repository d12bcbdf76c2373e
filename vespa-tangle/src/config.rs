// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::Address;
use vespa_storage::LeakDetectionOptions;

use serde::Deserialize;

use std::time::Duration;

const DEFAULT_CACHE_RESIDENCY_MS: u64 = 30_000;
const DEFAULT_LEAK_DETECTION_ENABLED: bool = false;
const DEFAULT_MAX_CONSUMERS_PER_OBJECT: usize = 20;
const DEFAULT_MAX_CONSUMER_HOLD_TIME_SEC: u64 = 100;

/// Builder for a [`TangleConfig`].
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TangleConfigBuilder {
    residency_ms: Option<u64>,
    leak_detection_enabled: Option<bool>,
    leak_detection_max_consumers_per_object: Option<usize>,
    leak_detection_max_consumer_hold_time_sec: Option<u64>,
}

impl TangleConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long released objects stay resident in the caches.
    pub fn residency_ms(mut self, residency_ms: u64) -> Self {
        self.residency_ms.replace(residency_ms);
        self
    }

    /// Enables or disables leak detection.
    pub fn leak_detection_enabled(mut self, enabled: bool) -> Self {
        self.leak_detection_enabled.replace(enabled);
        self
    }

    /// Builds the config with the given coordinator address.
    pub fn finish(self, coordinator_address: Address) -> TangleConfig {
        let leak_detection = if self.leak_detection_enabled.unwrap_or(DEFAULT_LEAK_DETECTION_ENABLED) {
            Some(LeakDetectionOptions {
                max_consumers_per_object: self
                    .leak_detection_max_consumers_per_object
                    .unwrap_or(DEFAULT_MAX_CONSUMERS_PER_OBJECT),
                max_consumer_hold_time: Duration::from_secs(
                    self.leak_detection_max_consumer_hold_time_sec
                        .unwrap_or(DEFAULT_MAX_CONSUMER_HOLD_TIME_SEC),
                ),
            })
        } else {
            None
        };

        TangleConfig {
            cache_time: Duration::from_millis(self.residency_ms.unwrap_or(DEFAULT_CACHE_RESIDENCY_MS)),
            leak_detection,
            coordinator_address,
        }
    }
}

/// Configuration of the tangle caches and milestone recognition.
#[derive(Clone)]
pub struct TangleConfig {
    pub(crate) cache_time: Duration,
    pub(crate) leak_detection: Option<LeakDetectionOptions>,
    pub(crate) coordinator_address: Address,
}

impl TangleConfig {
    /// Creates a builder.
    pub fn build() -> TangleConfigBuilder {
        TangleConfigBuilder::new()
    }

    /// The address milestone bundles are issued from.
    pub fn coordinator_address(&self) -> &Address {
        &self.coordinator_address
    }
}
