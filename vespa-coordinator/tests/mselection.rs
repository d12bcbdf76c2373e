// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use self::common::*;

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_common::event::Bus;
use vespa_coordinator::{mselection::HeaviestSelector, worker, Error, TipSelConfigBuilder};

use std::{collections::HashSet, sync::Arc};

fn selector(min: usize, max: usize, random: usize, deadline_ms: u64) -> HeaviestSelector {
    HeaviestSelector::new(
        TipSelConfigBuilder::new()
            .min_heaviest_branch_unconfirmed_transactions_threshold(min)
            .max_heaviest_branch_tips_per_checkpoint(max)
            .random_tips_per_checkpoint(random)
            .heaviest_branch_selection_deadline_milliseconds(deadline_ms)
            .finish(),
    )
}

#[test]
fn too_few_tracked_tails_yield_no_tips() {
    let tangle = test_tangle(Arc::new(Bus::default()));
    let selector = selector(3, 5, 0, 100);

    let a = spam_bundle(Hash::NULL, Hash::NULL, 0xa1);
    let tail = a.hash();
    store_all(&tangle, &[a]);

    selector.on_new_solid_bundle(&tangle, tail);
    assert_eq!(selector.tracked_tails_count(), 1);

    assert!(matches!(selector.select_tips(&tangle, 0), Err(Error::NoTipsAvailable)));
}

#[test]
fn selection_returns_distinct_tracked_tips_and_untracks_them() {
    let tangle = test_tangle(Arc::new(Bus::default()));
    let selector = selector(1, 10, 2, 100);

    let mut tails = HashSet::new();
    for i in 0..5u8 {
        let tx = spam_bundle(Hash::NULL, Hash::NULL, 0xa0 + i);
        let tail = tx.hash();
        store_all(&tangle, &[tx]);
        selector.on_new_solid_bundle(&tangle, tail);
        tails.insert(tail);
    }

    assert_eq!(selector.tracked_tails_count(), 5);

    let tips = selector.select_tips(&tangle, 0).unwrap();

    let distinct: HashSet<Hash> = tips.iter().copied().collect();
    assert_eq!(distinct.len(), tips.len());
    assert!(distinct.is_subset(&tails));

    // Everything was selected, so nothing stays tracked.
    assert_eq!(selector.tracked_tails_count(), 0);
    assert!(matches!(selector.select_tips(&tangle, 0), Err(Error::NoTipsAvailable)));
}

#[test]
fn ancestors_of_selected_tips_are_untracked() {
    let tangle = test_tangle(Arc::new(Bus::default()));
    let selector = selector(1, 1, 0, 100);

    let parent = spam_bundle(Hash::NULL, Hash::NULL, 0xa1);
    let parent_tail = parent.hash();
    store_all(&tangle, &[parent]);
    selector.on_new_solid_bundle(&tangle, parent_tail);

    let child = spam_bundle(parent_tail, parent_tail, 0xa2);
    let child_tail = child.hash();
    store_all(&tangle, &[child]);
    selector.on_new_solid_bundle(&tangle, child_tail);

    assert_eq!(selector.tracked_tails_count(), 2);

    let tips = selector.select_tips(&tangle, 0).unwrap();
    assert_eq!(tips.len(), 1);

    if tips[0] == child_tail {
        assert_eq!(selector.tracked_tails_count(), 0);
    } else {
        // The parent was picked; the child is no ancestor and stays.
        assert_eq!(selector.tracked_tails_count(), 1);
    }
}

#[test]
fn expired_deadline_yields_no_tips() {
    let tangle = test_tangle(Arc::new(Bus::default()));
    let selector = selector(1, 5, 0, 0);

    let tx = spam_bundle(Hash::NULL, Hash::NULL, 0xa1);
    let tail = tx.hash();
    store_all(&tangle, &[tx]);
    selector.on_new_solid_bundle(&tangle, tail);

    assert!(matches!(selector.select_tips(&tangle, 0), Err(Error::NoTipsAvailable)));
}

#[test]
fn extra_tips_extend_the_weighted_selection() {
    let tangle = test_tangle(Arc::new(Bus::default()));
    let selector = selector(1, 1, 0, 100);

    for i in 0..3u8 {
        let tx = spam_bundle(Hash::NULL, Hash::NULL, 0xa0 + i);
        let tail = tx.hash();
        store_all(&tangle, &[tx]);
        selector.on_new_solid_bundle(&tangle, tail);
    }

    let tips = selector.select_tips(&tangle, 1).unwrap();
    assert_eq!(tips.len(), 2);
}

#[test]
fn below_max_depth_criterion() {
    let tangle = test_tangle(Arc::new(Bus::default()));

    let tx = spam_bundle(Hash::NULL, Hash::NULL, 0xa1);
    let tail = tx.hash();
    store_all(&tangle, &[tx]);

    tangle.update_solid_milestone_index(MilestoneIndex(10));

    let cached_metadata = tangle.get_metadata(&tail).unwrap();

    // With the tip's oldest root snapshot index at 4 and the solid milestone
    // at 10, a threshold of 5 is exceeded.
    cached_metadata.set_root_snapshot_indexes(MilestoneIndex(4), MilestoneIndex(4));
    assert!(worker::is_below_max_depth(&tangle, &cached_metadata, 5));

    cached_metadata.set_root_snapshot_indexes(MilestoneIndex(6), MilestoneIndex(6));
    assert!(!worker::is_below_max_depth(&tangle, &cached_metadata, 5));

    cached_metadata.release(true);
}
