// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Events dispatched by the tangle on the node bus.

use vespa_bundle::{Address, Hash, MilestoneIndex};

/// A transaction was stored for the first time.
pub struct ProcessedTransaction(pub Hash);

/// The bundle with the given tail transaction became solid.
pub struct BundleSolid(pub Hash);

/// The solid milestone index advanced.
pub struct SolidMilestoneIndexChanged(pub MilestoneIndex);

/// An address was spent from.
pub struct AddressSpent(pub Address);

/// A milestone was confirmed; carries the tails it newly referenced.
pub struct MilestoneConfirmed {
    /// Index of the confirming milestone.
    pub index: MilestoneIndex,
    /// Tail transaction of the milestone bundle.
    pub tail: Hash,
    /// Tails of the bundles confirmed by this milestone.
    pub referenced_tails: Vec<Hash>,
}
