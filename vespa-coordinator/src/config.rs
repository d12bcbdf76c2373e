// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::MilestoneIndex;

use serde::Deserialize;

use std::{path::PathBuf, time::Duration};

const DEFAULT_INTERVAL_SECONDS: u32 = 60;
const DEFAULT_MWM: u8 = 14;
const DEFAULT_SECURITY_LEVEL: u8 = 2;
const DEFAULT_MERKLE_TREE_DEPTH: u8 = 23;
const DEFAULT_STATE_FILE_PATH: &str = "coordinator.state";

const DEFAULT_MIN_HEAVIEST_BRANCH_UNCONFIRMED_TRANSACTIONS_THRESHOLD: usize = 20;
const DEFAULT_MAX_HEAVIEST_BRANCH_TIPS_PER_CHECKPOINT: usize = 10;
const DEFAULT_RANDOM_TIPS_PER_CHECKPOINT: usize = 3;
const DEFAULT_HEAVIEST_BRANCH_SELECTION_DEADLINE_MILLISECONDS: u64 = 100;
const DEFAULT_MAX_TRACKED_TAILS: usize = 10_000;

/// Builder for a [`TipSelConfig`].
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipSelConfigBuilder {
    min_heaviest_branch_unconfirmed_transactions_threshold: Option<usize>,
    max_heaviest_branch_tips_per_checkpoint: Option<usize>,
    random_tips_per_checkpoint: Option<usize>,
    heaviest_branch_selection_deadline_milliseconds: Option<u64>,
    max_tracked_tails: Option<usize>,
}

impl TipSelConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum number of tracked tails required for a selection.
    pub fn min_heaviest_branch_unconfirmed_transactions_threshold(mut self, threshold: usize) -> Self {
        self.min_heaviest_branch_unconfirmed_transactions_threshold
            .replace(threshold);
        self
    }

    /// Sets the maximum number of weighted tips per checkpoint.
    pub fn max_heaviest_branch_tips_per_checkpoint(mut self, max: usize) -> Self {
        self.max_heaviest_branch_tips_per_checkpoint.replace(max);
        self
    }

    /// Sets the number of uniformly sampled extra tips per checkpoint.
    pub fn random_tips_per_checkpoint(mut self, random: usize) -> Self {
        self.random_tips_per_checkpoint.replace(random);
        self
    }

    /// Sets the selection deadline in milliseconds.
    pub fn heaviest_branch_selection_deadline_milliseconds(mut self, deadline: u64) -> Self {
        self.heaviest_branch_selection_deadline_milliseconds.replace(deadline);
        self
    }

    /// Sets the number of tracked tails that triggers a checkpoint.
    pub fn max_tracked_tails(mut self, max: usize) -> Self {
        self.max_tracked_tails.replace(max);
        self
    }

    /// Builds the config.
    pub fn finish(self) -> TipSelConfig {
        TipSelConfig {
            min_heaviest_branch_unconfirmed_transactions_threshold: self
                .min_heaviest_branch_unconfirmed_transactions_threshold
                .unwrap_or(DEFAULT_MIN_HEAVIEST_BRANCH_UNCONFIRMED_TRANSACTIONS_THRESHOLD),
            max_heaviest_branch_tips_per_checkpoint: self
                .max_heaviest_branch_tips_per_checkpoint
                .unwrap_or(DEFAULT_MAX_HEAVIEST_BRANCH_TIPS_PER_CHECKPOINT),
            random_tips_per_checkpoint: self
                .random_tips_per_checkpoint
                .unwrap_or(DEFAULT_RANDOM_TIPS_PER_CHECKPOINT),
            heaviest_branch_selection_deadline: Duration::from_millis(
                self.heaviest_branch_selection_deadline_milliseconds
                    .unwrap_or(DEFAULT_HEAVIEST_BRANCH_SELECTION_DEADLINE_MILLISECONDS),
            ),
            max_tracked_tails: self.max_tracked_tails.unwrap_or(DEFAULT_MAX_TRACKED_TAILS),
        }
    }
}

/// Configuration of the heaviest-branch tip selector.
#[derive(Clone)]
pub struct TipSelConfig {
    pub(crate) min_heaviest_branch_unconfirmed_transactions_threshold: usize,
    pub(crate) max_heaviest_branch_tips_per_checkpoint: usize,
    pub(crate) random_tips_per_checkpoint: usize,
    pub(crate) heaviest_branch_selection_deadline: Duration,
    pub(crate) max_tracked_tails: usize,
}

impl TipSelConfig {
    /// The number of tracked tails that triggers a checkpoint.
    pub fn max_tracked_tails(&self) -> usize {
        self.max_tracked_tails
    }
}

/// Builder for a [`CoordinatorConfig`].
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfigBuilder {
    interval_seconds: Option<u32>,
    mwm: Option<u8>,
    security_level: Option<u8>,
    merkle_tree_depth: Option<u8>,
    state_file_path: Option<String>,
    #[serde(default)]
    tipsel: TipSelConfigBuilder,
    #[serde(skip)]
    bootstrap: bool,
    #[serde(skip)]
    start_index: u32,
}

impl CoordinatorConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the milestone interval in seconds.
    pub fn interval_seconds(mut self, interval_seconds: u32) -> Self {
        self.interval_seconds.replace(interval_seconds);
        self
    }

    /// Sets the minimum weight magnitude the proof of work has to satisfy.
    pub fn mwm(mut self, mwm: u8) -> Self {
        self.mwm.replace(mwm);
        self
    }

    /// Sets the security level, i.e. the number of signature transactions
    /// per milestone.
    pub fn security_level(mut self, security_level: u8) -> Self {
        self.security_level.replace(security_level);
        self
    }

    /// Sets the depth of the coordinator's Merkle key tree.
    pub fn merkle_tree_depth(mut self, merkle_tree_depth: u8) -> Self {
        self.merkle_tree_depth.replace(merkle_tree_depth);
        self
    }

    /// Sets the path of the coordinator state file.
    pub fn state_file_path(mut self, state_file_path: impl Into<String>) -> Self {
        self.state_file_path.replace(state_file_path.into());
        self
    }

    /// Sets the tip selection configuration.
    pub fn tipsel(mut self, tipsel: TipSelConfigBuilder) -> Self {
        self.tipsel = tipsel;
        self
    }

    /// Requests bootstrapping the network at the given start index.
    pub fn bootstrap(mut self, bootstrap: bool, start_index: u32) -> Self {
        self.bootstrap = bootstrap;
        self.start_index = start_index;
        self
    }

    /// Builds the config.
    pub fn finish(self) -> CoordinatorConfig {
        CoordinatorConfig {
            interval: Duration::from_secs(u64::from(self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS))),
            mwm: self.mwm.unwrap_or(DEFAULT_MWM),
            security_level: self.security_level.unwrap_or(DEFAULT_SECURITY_LEVEL),
            merkle_tree_depth: self.merkle_tree_depth.unwrap_or(DEFAULT_MERKLE_TREE_DEPTH),
            state_file_path: PathBuf::from(
                self.state_file_path
                    .unwrap_or_else(|| DEFAULT_STATE_FILE_PATH.to_owned()),
            ),
            tipsel: self.tipsel.finish(),
            bootstrap: self.bootstrap,
            // Index 0 marks the unbootstrapped state; minting starts at 1.
            start_index: MilestoneIndex(self.start_index.max(1)),
        }
    }
}

/// Configuration of the coordinator.
#[derive(Clone)]
pub struct CoordinatorConfig {
    pub(crate) interval: Duration,
    pub(crate) mwm: u8,
    pub(crate) security_level: u8,
    pub(crate) merkle_tree_depth: u8,
    pub(crate) state_file_path: PathBuf,
    pub(crate) tipsel: TipSelConfig,
    pub(crate) bootstrap: bool,
    pub(crate) start_index: MilestoneIndex,
}

impl CoordinatorConfig {
    /// Creates a builder.
    pub fn build() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::new()
    }

    /// The milestone interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The minimum weight magnitude the proof of work has to satisfy.
    pub fn mwm(&self) -> u8 {
        self.mwm
    }

    /// The number of signature transactions per milestone.
    pub fn security_level(&self) -> u8 {
        self.security_level
    }

    /// The depth of the coordinator's Merkle key tree.
    pub fn merkle_tree_depth(&self) -> u8 {
        self.merkle_tree_depth
    }

    /// The tip selection configuration.
    pub fn tipsel(&self) -> &TipSelConfig {
        &self.tipsel
    }
}
