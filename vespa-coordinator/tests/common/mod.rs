// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use vespa_bundle::{Hash, MilestoneIndex, Transaction, HASH_LENGTH};
use vespa_common::event::Bus;
use vespa_coordinator::{KeyedSigner, MilestoneSigner, SendBundle};
use vespa_storage_memory::MemoryBackend;
use vespa_tangle::{snapshot::SnapshotInfo, Tangle, TangleConfigBuilder};

use std::sync::Arc;

pub fn seed() -> Hash {
    Hash::new([0x5eu8; HASH_LENGTH])
}

pub fn signer() -> KeyedSigner {
    KeyedSigner::new(seed(), 23, 1)
}

pub fn hash(byte: u8) -> Hash {
    Hash::new([byte; HASH_LENGTH])
}

/// A tangle recognizing the test signer's milestones, started from an empty
/// genesis snapshot.
pub fn test_tangle(bus: Arc<Bus<'static>>) -> Arc<Tangle> {
    let config = TangleConfigBuilder::new().finish(signer().address());
    let tangle = Arc::new(Tangle::new(Arc::new(MemoryBackend::new()), config, bus));
    tangle.init_solid_entry_points();
    tangle.set_snapshot_info(SnapshotInfo::new(
        signer().address(),
        MilestoneIndex(0),
        MilestoneIndex(0),
        1_600_000_000,
        true,
    ));

    tangle
}

/// An emitter storing bundles straight into the tangle; the synchronous
/// event dispatch provides the processed-transaction back-pressure.
pub fn tangle_emitter(tangle: Arc<Tangle>) -> SendBundle {
    Box::new(move |transactions, _is_milestone| {
        for transaction in transactions {
            let (cached, _) = tangle.store_transaction_if_absent(transaction.clone());
            cached.release(false);
        }

        Ok(())
    })
}

/// A single-transaction zero-value bundle on the given tips.
pub fn spam_bundle(trunk: Hash, branch: Hash, discriminator: u8) -> Transaction {
    Transaction::new(
        trunk,
        branch,
        Hash::new([discriminator; HASH_LENGTH]),
        Hash::NULL,
        0,
        0,
        0,
        0,
        1_600_000_000,
    )
    .unwrap()
}

pub fn store_all(tangle: &Tangle, transactions: &[Transaction]) {
    for transaction in transactions {
        let (cached, _) = tangle.store_transaction_if_absent(transaction.clone());
        cached.release(false);
    }
}
