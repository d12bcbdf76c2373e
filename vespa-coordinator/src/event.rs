// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Events dispatched by the coordinator.

use vespa_bundle::{Hash, MilestoneIndex};

/// A checkpoint transaction was issued.
pub struct IssuedCheckpointTransaction {
    /// Index of the checkpoint since the last milestone.
    pub checkpoint_index: usize,
    /// Index of the tip within the checkpoint.
    pub tip_index: usize,
    /// Total number of tips of the checkpoint.
    pub tips_total: usize,
    /// Hash of the issued transaction.
    pub hash: Hash,
}

/// A milestone was issued.
pub struct IssuedMilestone {
    /// Index of the milestone.
    pub index: MilestoneIndex,
    /// Tail transaction of the milestone bundle.
    pub tail: Hash,
}
