// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use vespa_bundle::{Hash, Transaction, HASH_LENGTH};
use vespa_common::event::Bus;
use vespa_storage_memory::MemoryBackend;
use vespa_tangle::{Tangle, TangleConfigBuilder};

use std::sync::Arc;

/// The address milestone bundles are recognized by in tests.
pub fn coordinator_address() -> Hash {
    Hash::new([0xc0u8; HASH_LENGTH])
}

pub fn hash(byte: u8) -> Hash {
    Hash::new([byte; HASH_LENGTH])
}

pub fn test_tangle() -> Arc<Tangle> {
    test_tangle_on(Arc::new(MemoryBackend::new()), Arc::new(Bus::default()))
}

pub fn test_tangle_on(backend: Arc<MemoryBackend>, bus: Arc<Bus<'static>>) -> Arc<Tangle> {
    let config = TangleConfigBuilder::new().finish(coordinator_address());
    let tangle = Arc::new(Tangle::new(backend, config, bus));
    tangle.init_solid_entry_points();

    tangle
}

pub fn transaction(trunk: Hash, branch: Hash, bundle: Hash, index: u64, last_index: u64, value: i64) -> Transaction {
    Transaction::new(
        trunk,
        branch,
        bundle,
        Hash::new([index as u8 + 1; HASH_LENGTH]),
        value,
        index,
        last_index,
        0,
        1_600_000_000,
    )
    .unwrap()
}

/// Builds a complete bundle of `values.len()` transactions, chained tail to
/// head along trunk references. The head approves `trunk` and `branch`;
/// every other transaction approves the head's trunk as its branch, so the
/// bundle satisfies the strict semantic rules when both approvees are tails
/// or solid entry points. Returned tail first.
pub fn build_bundle(trunk: Hash, branch: Hash, bundle: Hash, tag: u64, values: &[(Hash, i64)]) -> Vec<Transaction> {
    let last_index = values.len() as u64 - 1;

    let mut transactions = Vec::with_capacity(values.len());
    let mut next_hash = trunk;

    for i in (0..=last_index).rev() {
        let (tx_trunk, tx_branch) = if i == last_index {
            (trunk, branch)
        } else {
            (next_hash, trunk)
        };

        let (address, value) = values[i as usize];
        let transaction =
            Transaction::new(tx_trunk, tx_branch, bundle, address, value, i, last_index, tag, 1_600_000_000).unwrap();

        next_hash = transaction.hash();
        transactions.push(transaction);
    }

    transactions.reverse();
    transactions
}

/// Builds a milestone bundle with the given index encoded in the tag, issued
/// from the coordinator address.
pub fn build_milestone(trunk: Hash, branch: Hash, index: u32, security_level: usize) -> Vec<Transaction> {
    let values: Vec<(Hash, i64)> = (0..=security_level).map(|_| (coordinator_address(), 0)).collect();
    let bundle = Hash::digest(&index.to_be_bytes());

    build_bundle(trunk, branch, bundle, u64::from(index), &values)
}

pub fn store_all(tangle: &Tangle, transactions: &[Transaction]) {
    for transaction in transactions {
        let (cached, _) = tangle.store_transaction_if_absent(transaction.clone());
        cached.release(false);
    }
}
