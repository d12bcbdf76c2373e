// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Events dispatched by the peer protocol and the warp-sync controller.

use crate::heartbeat::Heartbeat;

use vespa_bundle::MilestoneIndex;

use std::time::Duration;

/// A peer finished the handshake.
pub struct PeerConnected {
    /// Transport-assigned id of the peer.
    pub peer_id: String,
}

/// A fresh heartbeat arrived from a peer.
pub struct HeartbeatUpdated {
    /// Transport-assigned id of the peer.
    pub peer_id: String,
    /// The heartbeat.
    pub heartbeat: Heartbeat,
}

/// The warp-sync target advanced to a higher milestone.
pub struct TargetUpdated {
    /// The new target milestone index.
    pub target: MilestoneIndex,
}

/// The warp-sync checkpoint advanced.
pub struct CheckpointUpdated {
    /// The next checkpoint milestone index.
    pub next_checkpoint: MilestoneIndex,
    /// The previous checkpoint milestone index.
    pub old_checkpoint: MilestoneIndex,
    /// How many milestones a checkpoint advances at a time.
    pub advancement_range: u32,
}

/// Warp-sync started towards a target milestone.
pub struct SyncStarted {
    /// The target milestone index.
    pub target: MilestoneIndex,
    /// The first checkpoint milestone index.
    pub next_checkpoint: MilestoneIndex,
    /// How many milestones a checkpoint advances at a time.
    pub advancement_range: u32,
}

/// Warp-sync reached its target.
pub struct SyncDone {
    /// Number of milestones synchronized.
    pub synced: u32,
    /// How long the synchronization took.
    pub took: Duration,
}
