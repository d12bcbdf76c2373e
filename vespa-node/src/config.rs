// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::Hash;
use vespa_common::logger::{LoggerConfig, LoggerConfigBuilder};
use vespa_coordinator::{CoordinatorConfig, CoordinatorConfigBuilder, KeyedSigner, MilestoneSigner};
use vespa_protocol::{WarpSyncConfig, WarpSyncConfigBuilder};
use vespa_tangle::{TangleConfig, TangleConfigBuilder};

use serde::Deserialize;

use std::path::Path;

const DEFAULT_BELOW_MAX_DEPTH: u32 = 15;

/// Builder for the node-level tip selection settings.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTipSelConfigBuilder {
    below_max_depth: Option<u32>,
}

/// Builder for the snapshot settings.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfigBuilder {
    path: Option<String>,
}

/// Builder for a [`NodeConfig`], deserialized from the TOML config file.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfigBuilder {
    #[serde(default)]
    logger: LoggerConfigBuilder,
    #[serde(default)]
    cache: TangleConfigBuilder,
    #[serde(default)]
    coordinator: CoordinatorConfigBuilder,
    #[serde(default)]
    tipsel: NodeTipSelConfigBuilder,
    #[serde(default)]
    warpsync: WarpSyncConfigBuilder,
    #[serde(default)]
    snapshot: SnapshotConfigBuilder,
}

impl NodeConfigBuilder {
    /// Reads the builder from a TOML file; a missing file yields defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::NodeError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Builds the config. The tangle recognizes milestone bundles by the
    /// coordinator address, which is derived from the seed and the Merkle
    /// tree depth; the bootstrap flags come from the hidden CLI flags.
    pub fn finish(self, seed: Hash, bootstrap: bool, start_index: u32) -> NodeConfig {
        let coordinator = self.coordinator.bootstrap(bootstrap, start_index).finish();

        let coordinator_address =
            KeyedSigner::new(seed, coordinator.merkle_tree_depth(), coordinator.security_level()).address();

        NodeConfig {
            logger: self.logger.finish(),
            cache: self.cache.finish(coordinator_address),
            coordinator,
            below_max_depth: self.tipsel.below_max_depth.unwrap_or(DEFAULT_BELOW_MAX_DEPTH),
            warpsync: self.warpsync.finish(),
            snapshot_path: self.snapshot.path,
        }
    }
}

/// The full node configuration.
pub struct NodeConfig {
    /// Logger configuration.
    pub logger: LoggerConfig,
    /// Cache configuration of the tangle storages.
    pub cache: TangleConfig,
    /// Coordinator configuration.
    pub coordinator: CoordinatorConfig,
    /// Below-max-depth threshold for tip selection.
    pub below_max_depth: u32,
    /// Warp-sync configuration.
    pub warpsync: WarpSyncConfig,
    /// Path of the local snapshot file, if any.
    pub snapshot_path: Option<String>,
}
