// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use self::common::*;

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_tangle::{traversal, Error};

/// A chain of approvals: `c` approves `b` approves `a`, with `a` the only
/// tail. The genesis references are solid entry points.
fn chain(tangle: &vespa_tangle::Tangle) -> (Hash, Hash, Hash) {
    let a = transaction(Hash::NULL, Hash::NULL, hash(0xa0), 0, 0, 0);
    let hash_a = a.hash();
    let b = transaction(hash_a, hash_a, hash(0xb0), 1, 1, 0);
    let hash_b = b.hash();
    let c = transaction(hash_b, hash_b, hash(0xc0), 1, 1, 0);
    let hash_c = c.hash();

    store_all(tangle, &[a, b, c]);

    (hash_a, hash_b, hash_c)
}

#[test]
fn visits_past_cone_in_depth_first_order() {
    let tangle = test_tangle();
    let (a, b, c) = chain(&tangle);

    let mut visited = Vec::new();

    traversal::traverse_approvees(
        &tangle,
        c,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        |_| Ok(()),
        |_| {},
        false,
        false,
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![c, b, a]);
}

#[test]
fn tails_only_skips_non_tails() {
    let tangle = test_tangle();
    let (a, _, c) = chain(&tangle);

    let mut visited = Vec::new();

    traversal::traverse_approvees(
        &tangle,
        c,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        |_| Ok(()),
        |_| {},
        false,
        true,
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![a]);
}

#[test]
fn trunk_subtree_is_visited_before_branch_subtree() {
    // d approves b (trunk) and c (branch); both approve a.
    let tangle = test_tangle();

    let a = transaction(Hash::NULL, Hash::NULL, hash(0xa0), 0, 0, 0);
    let hash_a = a.hash();
    let b = transaction(hash_a, hash_a, hash(0xb0), 0, 0, 0);
    let hash_b = b.hash();
    let c = transaction(hash_a, hash_a, hash(0xc0), 0, 0, 0);
    let hash_c = c.hash();
    let d = transaction(hash_b, hash_c, hash(0xd0), 0, 0, 0);
    let hash_d = d.hash();

    store_all(&tangle, &[a, b, c, d]);

    let mut visited = Vec::new();

    traversal::traverse_approvees(
        &tangle,
        hash_d,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        |_| Ok(()),
        |_| {},
        false,
        false,
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![hash_d, hash_b, hash_a, hash_c]);
}

#[test]
fn solid_entry_points_stop_the_walk() {
    let tangle = test_tangle();
    let (a, b, c) = chain(&tangle);

    tangle.add_solid_entry_point(a, MilestoneIndex(3));

    let mut visited = Vec::new();
    let mut entry_points = Vec::new();

    traversal::traverse_approvees(
        &tangle,
        c,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        |_| Ok(()),
        |hash| entry_points.push(*hash),
        false,
        false,
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![c, b]);
    assert_eq!(entry_points, vec![a]);
}

#[test]
fn solid_entry_points_are_traversed_on_request() {
    let tangle = test_tangle();
    let (a, b, c) = chain(&tangle);

    tangle.add_solid_entry_point(a, MilestoneIndex(3));

    let mut visited = Vec::new();
    let mut entry_points = Vec::new();

    traversal::traverse_approvees(
        &tangle,
        c,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        |_| Ok(()),
        |hash| entry_points.push(*hash),
        true,
        false,
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![c, b, a]);
    assert_eq!(entry_points, vec![a]);
}

#[test]
fn missing_approvee_continues_or_fails_per_handler() {
    let tangle = test_tangle();

    let unknown = hash(0x77);
    let x = transaction(unknown, unknown, hash(0xa0), 0, 0, 0);
    let hash_x = x.hash();
    store_all(&tangle, &[x]);

    let mut missing = Vec::new();

    traversal::traverse_approvees(
        &tangle,
        hash_x,
        |_| Ok(true),
        |_| Ok(()),
        |hash| {
            missing.push(*hash);
            Ok(())
        },
        |_| {},
        false,
        false,
        false,
        None,
    )
    .unwrap();

    assert_eq!(missing, vec![unknown]);

    let result = traversal::traverse_approvees(
        &tangle,
        hash_x,
        |_| Ok(true),
        |_| Ok(()),
        |hash| Err(Error::TransactionNotFound(*hash)),
        |_| {},
        false,
        false,
        false,
        None,
    );

    assert!(matches!(result, Err(Error::TransactionNotFound(h)) if h == unknown));
}

#[test]
fn combined_trunk_branch_walk_visits_shared_ancestors_once() {
    let tangle = test_tangle();

    let a = transaction(Hash::NULL, Hash::NULL, hash(0xa0), 0, 0, 0);
    let hash_a = a.hash();
    let b = transaction(hash_a, hash_a, hash(0xb0), 0, 0, 0);
    let hash_b = b.hash();
    let c = transaction(hash_a, hash_a, hash(0xc0), 0, 0, 0);
    let hash_c = c.hash();

    store_all(&tangle, &[a, b, c]);

    let mut visited = Vec::new();

    traversal::traverse_approvees_trunk_branch(
        &tangle,
        hash_b,
        hash_c,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        |_| Ok(()),
        |_| {},
        false,
        false,
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![hash_b, hash_a, hash_c]);
}

#[test]
fn abort_signal_terminates_the_walk_promptly() {
    let tangle = test_tangle();
    let (_, _, c) = chain(&tangle);

    let (sender, receiver) = flume::bounded::<()>(1);
    sender.send(()).unwrap();

    let mut visited = 0;

    let result = traversal::traverse_approvees(
        &tangle,
        c,
        |_| Ok(true),
        |_| {
            visited += 1;
            Ok(())
        },
        |_| Ok(()),
        |_| {},
        false,
        false,
        false,
        Some(&receiver),
    );

    assert!(matches!(result, Err(Error::OperationAborted)));
    assert_eq!(visited, 0);
}

#[test]
fn approvers_walk_covers_the_future_cone() {
    let tangle = test_tangle();
    let (a, b, c) = chain(&tangle);

    let mut visited = Vec::new();

    traversal::traverse_approvers(
        &tangle,
        a,
        |_| Ok(true),
        |metadata| {
            visited.push(*metadata.hash());
            Ok(())
        },
        false,
        None,
    )
    .unwrap();

    assert_eq!(visited, vec![a, b, c]);
}

#[test]
fn find_all_tails_finds_the_referenced_tails() {
    let tangle = test_tangle();
    let (a, _, c) = chain(&tangle);

    let tails = traversal::find_all_tails(&tangle, c, true, false).unwrap();

    assert_eq!(tails.len(), 1);
    assert!(tails.contains(&a));
}
