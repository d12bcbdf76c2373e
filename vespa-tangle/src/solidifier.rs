// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Solidity propagation: a transaction is solid when its trunk and branch are
//! solid or solid entry points. Newly solid tails latch their bundle solid
//! and may confirm milestones.

use crate::{
    event::{BundleSolid, MilestoneConfirmed},
    tangle::{CachedBundle, Tangle},
    traversal,
};

use vespa_bundle::{Hash, MilestoneIndex};

use log::info;

use std::collections::VecDeque;

fn solid_or_entry_point(tangle: &Tangle, hash: &Hash) -> bool {
    if tangle.solid_entry_points_contain(hash) {
        return true;
    }

    match tangle.get_metadata(hash) {
        Some(cached_metadata) => {
            let solid = cached_metadata.is_solid();
            cached_metadata.release(false);
            solid
        }
        None => false,
    }
}

/// Walks the future cone of the given transaction, marking every transaction
/// whose parents are solid. Fires `BundleSolid` for tails that became solid
/// and advances the solid milestone when a milestone bundle did.
pub fn propagate_solid_cone(tangle: &Tangle, start: Hash) {
    let mut queue = VecDeque::new();
    queue.push_back(start);

    while let Some(hash) = queue.pop_front() {
        let cached_metadata = match tangle.get_metadata(&hash) {
            Some(cached_metadata) => cached_metadata,
            None => continue,
        };

        if cached_metadata.is_solid() {
            cached_metadata.release(false);
            continue;
        }

        let parents_solid = solid_or_entry_point(tangle, cached_metadata.trunk())
            && solid_or_entry_point(tangle, cached_metadata.branch());

        if !parents_solid {
            cached_metadata.release(false);
            continue;
        }

        cached_metadata.set_solid(true);
        let is_tail = cached_metadata.is_tail();
        cached_metadata.release(false);

        if is_tail {
            on_tail_solid(tangle, hash);
        }

        for approver in tangle.get_approvers(&hash) {
            queue.push_back(approver);
        }
    }
}

fn on_tail_solid(tangle: &Tangle, tail: Hash) {
    let cached_bundle = match tangle.get_bundle(&tail) {
        Some(cached_bundle) => cached_bundle,
        // The bundle is still incomplete; it becomes solid once its last
        // member arrives and completes it.
        None => return,
    };

    // Latch the bundle flag now that the tail is solid.
    cached_bundle.is_solid(tangle);

    tangle.bus().dispatch(BundleSolid(tail));

    if cached_bundle.is_milestone() {
        let index = cached_bundle.milestone_index(tangle);

        if index > tangle.get_solid_milestone_index() {
            confirm_milestone(tangle, &cached_bundle, index);
            tangle.update_solid_milestone_index(index);
        }
    }

    cached_bundle.release(false);
}

/// Confirms the past cone of a solid milestone: marks every newly referenced
/// transaction confirmed, seeds its root snapshot indexes and applies spent
/// addresses of the referenced bundles.
fn confirm_milestone(tangle: &Tangle, bundle: &CachedBundle, index: MilestoneIndex) {
    let tail = *bundle.tail_hash();
    let mut referenced_tails = Vec::new();

    // The callbacks are infallible and no abort channel is passed, so the
    // walk cannot fail.
    let _ = traversal::traverse_approvees(
        tangle,
        tail,
        |cached_metadata| Ok(!cached_metadata.is_confirmed()),
        |cached_metadata| {
            cached_metadata.set_confirmed(true);
            cached_metadata.set_root_snapshot_indexes(index, index);

            if cached_metadata.is_tail() {
                referenced_tails.push(*cached_metadata.hash());
            }

            Ok(())
        },
        // During sync parts of the cone may not have arrived yet; they are
        // confirmed once their own milestone becomes solid.
        |_| Ok(()),
        |_| {},
        false,
        false,
        false,
        None,
    );

    for referenced in &referenced_tails {
        if let Some(cached_bundle) = tangle.get_bundle(referenced) {
            cached_bundle.is_confirmed(tangle);
            cached_bundle.apply_spent_addresses(tangle);
            cached_bundle.release(false);
        }
    }

    info!("Milestone {} confirmed {} bundles.", index, referenced_tails.len());

    tangle.bus().dispatch(MilestoneConfirmed {
        index,
        tail,
        referenced_tails,
    });
}

/// Re-checks solidity across the whole tangle, kick-starting propagation for
/// transactions whose parents arrived while they were already stored.
pub fn trigger_solidifier(tangle: &Tangle) {
    let mut candidates = Vec::new();

    tangle.metadata.for_each(|_, metadata| {
        if !metadata.is_solid() {
            candidates.push(*metadata.hash());
        }
        true
    });

    for hash in candidates {
        propagate_solid_cone(tangle, hash);
    }
}
