// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use self::common::*;

use vespa_bundle::{Hash, MilestoneIndex, Transaction, HASH_LENGTH};

#[test]
fn bundle_completes_with_the_last_member_and_validates() {
    let tangle = test_tangle();

    // a(-5) <- b(+5) <- c(0), tail a, last index 2.
    let transactions = build_bundle(
        Hash::NULL,
        Hash::NULL,
        hash(0xbd),
        0,
        &[(hash(0x0a), -5), (hash(0x0b), 5), (hash(0x0c), 0)],
    );
    let tail = transactions[0].hash();

    store_all(&tangle, &transactions[..2]);
    assert!(!tangle.contains_bundle(&tail));

    store_all(&tangle, &transactions[2..]);
    let cached_bundle = tangle.get_bundle(&tail).expect("bundle must be complete");

    assert!(cached_bundle.is_complete());
    assert_eq!(cached_bundle.last_index(), 2);
    assert_eq!(cached_bundle.transaction_hashes().len(), 3);

    assert!(cached_bundle.is_valid(&tangle));
    assert!(cached_bundle.valid_strict_semantics(&tangle));
    assert!(!cached_bundle.is_value_spam());

    // The net ledger change of a valid bundle sums to zero.
    assert_eq!(cached_bundle.ledger_changes().values().sum::<i64>(), 0);

    cached_bundle.release(true);
}

#[test]
fn completion_is_insertion_order_independent() {
    let tangle = test_tangle();

    let transactions = build_bundle(
        Hash::NULL,
        Hash::NULL,
        hash(0xbd),
        0,
        &[(hash(0x0a), -1), (hash(0x0b), 1)],
    );
    let tail = transactions[0].hash();

    // Head first.
    store_all(&tangle, &[transactions[1].clone()]);
    assert!(!tangle.contains_bundle(&tail));

    store_all(&tangle, &[transactions[0].clone()]);
    assert!(tangle.contains_bundle(&tail));
}

#[test]
fn unbalanced_bundle_is_invalid_but_retained() {
    let tangle = test_tangle();

    let transactions = build_bundle(
        Hash::NULL,
        Hash::NULL,
        hash(0xbd),
        0,
        &[(hash(0x0a), -5), (hash(0x0b), 4)],
    );
    let tail = transactions[0].hash();

    store_all(&tangle, &transactions);

    let cached_bundle = tangle.get_bundle(&tail).expect("bundle must be complete");

    assert!(!cached_bundle.is_valid(&tangle));
    assert!(tangle.contains_bundle(&tail));

    cached_bundle.release(true);
}

#[test]
fn zero_sum_per_address_is_value_spam() {
    let tangle = test_tangle();

    let address = hash(0x0a);
    let transactions = build_bundle(Hash::NULL, Hash::NULL, hash(0xbd), 0, &[(address, -3), (address, 3)]);
    let tail = transactions[0].hash();

    store_all(&tangle, &transactions);

    let cached_bundle = tangle.get_bundle(&tail).unwrap();

    assert!(cached_bundle.is_valid(&tangle));
    assert!(cached_bundle.is_value_spam());

    cached_bundle.release(true);
}

#[test]
fn wrong_branch_breaks_strict_semantics_only() {
    let tangle = test_tangle();

    // Another tail the non-head transaction wrongly branches to.
    let other = transaction(Hash::NULL, Hash::NULL, hash(0x99), 0, 0, 0);
    let other_hash = other.hash();
    store_all(&tangle, &[other]);

    // Hand-built two-transaction bundle: the head is fine, but the tail
    // branches to `other` instead of the head's trunk.
    let bundle_hash = hash(0xbd);
    let head = Transaction::new(Hash::NULL, Hash::NULL, bundle_hash, hash(0x0b), 5, 1, 1, 0, 1_600_000_000).unwrap();
    let tail = Transaction::new(head.hash(), other_hash, bundle_hash, hash(0x0a), -5, 0, 1, 0, 1_600_000_000).unwrap();
    let tail_hash = tail.hash();

    store_all(&tangle, &[head, tail]);

    let cached_bundle = tangle.get_bundle(&tail_hash).expect("bundle must be complete");

    assert!(cached_bundle.is_valid(&tangle));
    assert!(!cached_bundle.valid_strict_semantics(&tangle));

    cached_bundle.release(true);
}

#[test]
fn head_approving_a_non_tail_breaks_strict_semantics() {
    let tangle = test_tangle();

    // A non-tail transaction the head will approve.
    let tail_of_other = transaction(Hash::NULL, Hash::NULL, hash(0x99), 0, 1, -1);
    let non_tail = Transaction::new(
        Hash::NULL,
        Hash::NULL,
        hash(0x99),
        hash(0x0f),
        1,
        1,
        1,
        0,
        1_600_000_000,
    )
    .unwrap();
    let non_tail_hash = non_tail.hash();
    store_all(&tangle, &[tail_of_other, non_tail]);

    let transactions = build_bundle(
        non_tail_hash,
        non_tail_hash,
        hash(0xbd),
        0,
        &[(hash(0x0a), -5), (hash(0x0b), 5)],
    );
    let tail_hash = transactions[0].hash();

    store_all(&tangle, &transactions);

    let cached_bundle = tangle.get_bundle(&tail_hash).unwrap();

    assert!(cached_bundle.is_valid(&tangle));
    assert!(!cached_bundle.valid_strict_semantics(&tangle));

    cached_bundle.release(true);
}

#[test]
fn milestone_bundle_is_recognized_and_registered() {
    let tangle = test_tangle();

    let transactions = build_milestone(Hash::NULL, Hash::NULL, 7, 2);
    let tail = transactions[0].hash();

    store_all(&tangle, &transactions);

    let cached_bundle = tangle.get_bundle(&tail).expect("bundle must be complete");

    assert!(cached_bundle.is_milestone());
    assert_eq!(cached_bundle.milestone_index(&tangle), MilestoneIndex(7));
    // Milestones are exempt from the strict checks.
    assert!(cached_bundle.is_valid(&tangle));
    assert!(cached_bundle.valid_strict_semantics(&tangle));

    cached_bundle.release(true);

    assert!(tangle.contains_milestone(MilestoneIndex(7)));
    assert_eq!(tangle.get_milestone_hash(MilestoneIndex(7)), Some(tail));
    assert_eq!(tangle.get_latest_milestone_index(), MilestoneIndex(7));

    let cached_metadata = tangle.get_metadata(&tail).unwrap();
    assert!(cached_metadata.is_milestone());
    cached_metadata.release(true);
}

#[test]
fn bundle_solidity_reads_through_to_the_tail() {
    let tangle = test_tangle();

    let transactions = build_bundle(Hash::NULL, Hash::NULL, hash(0xbd), 0, &[(hash(0x0a), 0)]);
    let tail = transactions[0].hash();

    store_all(&tangle, &transactions);

    let cached_bundle = tangle.get_bundle(&tail).unwrap();

    // The genesis references are solid entry points, so the tail
    // solidified on insertion.
    assert!(cached_bundle.is_solid(&tangle));

    cached_bundle.release(true);
}

#[test]
fn null_address_bundle_is_no_milestone() {
    let tangle = test_tangle();

    let transactions = build_bundle(Hash::NULL, Hash::NULL, hash(0xbd), 3, &[(Hash::new([0u8; HASH_LENGTH]), 0)]);
    let tail = transactions[0].hash();

    store_all(&tangle, &transactions);

    let cached_bundle = tangle.get_bundle(&tail).unwrap();
    assert!(!cached_bundle.is_milestone());
    cached_bundle.release(true);

    assert!(!tangle.contains_milestone(MilestoneIndex(3)));
}
