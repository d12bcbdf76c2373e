// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    event::AddressSpent,
    tangle::{CachedMetadata, CachedTransaction, Tangle},
};

use vespa_bundle::{Address, Hash, MilestoneIndex, Transaction};
use vespa_common::packable::Packable;
use vespa_storage::{StorableObject, StorableObjectFlags};

use bitflags::bitflags;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex,
    },
};

bitflags! {
    /// Flags of a bundle.
    pub struct BundleFlags: u8 {
        /// The tail of the bundle is solid.
        const SOLID = 0b0000_0001;
        /// The bundle passed semantic validation.
        const VALID = 0b0000_0010;
        /// The bundle is referenced by a milestone.
        const CONFIRMED = 0b0000_0100;
        /// The bundle is a milestone bundle.
        const MILESTONE = 0b0000_1000;
        /// Every net ledger change of the bundle is zero.
        const VALUE_SPAM = 0b0001_0000;
        /// The bundle additionally passed the strict semantic checks.
        const VALID_STRICT_SEMANTICS = 0b0010_0000;
        /// The bundle conflicts with the ledger state.
        const CONFLICTING = 0b0100_0000;
        /// The past cone of the bundle contains an invalid bundle.
        const INVALID_PAST_CONE = 0b1000_0000;
    }
}

/// A bundle, keyed by its tail transaction hash.
///
/// A bundle object only exists once it is *complete*, i.e. all
/// `last_index + 1` member transactions are stored and chained tail to head
/// along trunk references. Validation runs once, on the first validity query
/// after completion. Invalid bundles are marked and retained.
pub struct Bundle {
    object_flags: StorableObjectFlags,
    tail: Hash,
    hash: Hash,
    head: Hash,
    last_index: u64,
    txs: HashSet<Hash>,
    ledger_changes: HashMap<Address, i64>,
    flags: AtomicU8,
    validated: Mutex<bool>,
    milestone_index: Mutex<Option<MilestoneIndex>>,
}

impl Bundle {
    #[allow(clippy::too_many_arguments)]
    fn new(
        tail: Hash,
        hash: Hash,
        head: Hash,
        last_index: u64,
        txs: HashSet<Hash>,
        ledger_changes: HashMap<Address, i64>,
        is_value_spam: bool,
        is_milestone: bool,
    ) -> Self {
        let mut flags = BundleFlags::empty();
        if is_value_spam {
            flags |= BundleFlags::VALUE_SPAM;
        }
        if is_milestone {
            flags |= BundleFlags::MILESTONE;
        }

        Self {
            object_flags: StorableObjectFlags::default(),
            tail,
            hash,
            head,
            last_index,
            txs,
            ledger_changes,
            flags: AtomicU8::new(flags.bits()),
            validated: Mutex::new(false),
            milestone_index: Mutex::new(None),
        }
    }

    /// The bundle hash shared by all member transactions.
    pub fn bundle_hash(&self) -> &Hash {
        &self.hash
    }

    /// The tail transaction of the bundle.
    pub fn tail_hash(&self) -> &Hash {
        if self.tail.is_null() {
            panic!("Tail hash can never be empty.");
        }

        &self.tail
    }

    /// The head transaction of the bundle.
    pub fn head_hash(&self) -> &Hash {
        if self.head.is_null() {
            panic!("Head hash can never be empty.");
        }

        &self.head
    }

    /// The last index of the bundle.
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// The hashes of all member transactions. Unordered.
    pub fn transaction_hashes(&self) -> Vec<Hash> {
        self.txs.iter().copied().collect()
    }

    /// Whether all member transactions are present. Holds by construction
    /// and never regresses.
    pub fn is_complete(&self) -> bool {
        self.txs.len() as u64 == self.last_index + 1
    }

    /// The net ledger change per address.
    pub fn ledger_changes(&self) -> &HashMap<Address, i64> {
        &self.ledger_changes
    }

    fn flags_value(&self) -> BundleFlags {
        BundleFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    fn modify_flag(&self, flag: BundleFlags, value: bool) {
        let previous = if value {
            self.flags.fetch_or(flag.bits(), Ordering::SeqCst)
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::SeqCst)
        };

        if (previous & flag.bits() != 0) != value {
            self.object_flags.set_modified(true);
        }
    }

    /// Whether this is a milestone bundle.
    pub fn is_milestone(&self) -> bool {
        self.flags_value().contains(BundleFlags::MILESTONE)
    }

    /// Whether every net ledger change of the bundle is zero.
    pub fn is_value_spam(&self) -> bool {
        self.flags_value().contains(BundleFlags::VALUE_SPAM)
    }

    /// Whether the past cone of the bundle contains an invalid bundle.
    pub fn is_invalid_past_cone(&self) -> bool {
        self.flags_value().contains(BundleFlags::INVALID_PAST_CONE)
    }

    /// Marks the past cone of the bundle as invalid.
    pub fn set_invalid_past_cone(&self, invalid: bool) {
        self.modify_flag(BundleFlags::INVALID_PAST_CONE, invalid);
    }

    /// Marks the bundle as conflicting with the ledger state.
    pub fn set_conflicting(&self, conflicting: bool) {
        self.modify_flag(BundleFlags::CONFLICTING, conflicting);
    }

    /// Loads the metadata of the tail transaction.
    pub fn get_tail_metadata(&self, tangle: &Tangle) -> CachedMetadata {
        load_bundle_tx_metadata_or_panic(tangle, self.tail_hash(), &self.hash)
    }

    /// Loads the metadata of the head transaction.
    pub fn get_head_metadata(&self, tangle: &Tangle) -> CachedMetadata {
        load_bundle_tx_metadata_or_panic(tangle, self.head_hash(), &self.hash)
    }

    /// Whether the tail of the bundle is solid. Reading through to the tail
    /// metadata latches the bundle flag.
    pub fn is_solid(&self, tangle: &Tangle) -> bool {
        if self.flags_value().contains(BundleFlags::SOLID) {
            return true;
        }

        let cached_metadata = self.get_tail_metadata(tangle);
        let tail_solid = cached_metadata.is_solid();
        cached_metadata.release(true);

        if tail_solid {
            self.modify_flag(BundleFlags::SOLID, true);
        }

        tail_solid
    }

    /// Whether the bundle is referenced by a milestone. Reads through to the
    /// tail metadata and latches the bundle flag.
    pub fn is_confirmed(&self, tangle: &Tangle) -> bool {
        if self.flags_value().contains(BundleFlags::CONFIRMED) {
            return true;
        }

        let cached_metadata = self.get_tail_metadata(tangle);
        let tail_confirmed = cached_metadata.is_confirmed();
        cached_metadata.release(true);

        if tail_confirmed {
            self.modify_flag(BundleFlags::CONFIRMED, true);
        }

        tail_confirmed
    }

    /// Whether the bundle conflicts with the ledger state. Reads through to
    /// the tail metadata and latches the bundle flag.
    pub fn is_conflicting(&self, tangle: &Tangle) -> bool {
        if self.flags_value().contains(BundleFlags::CONFLICTING) {
            return true;
        }

        let cached_metadata = self.get_tail_metadata(tangle);
        let tail_conflicting = cached_metadata.is_conflicting();
        cached_metadata.release(true);

        if tail_conflicting {
            self.modify_flag(BundleFlags::CONFLICTING, true);
        }

        tail_conflicting
    }

    /// Whether the bundle is semantically valid. The first query after
    /// completion runs the validation.
    pub fn is_valid(&self, tangle: &Tangle) -> bool {
        self.ensure_validated(tangle);
        self.flags_value().contains(BundleFlags::VALID)
    }

    /// Whether the bundle additionally satisfies the strict semantic rules.
    pub fn valid_strict_semantics(&self, tangle: &Tangle) -> bool {
        self.ensure_validated(tangle);
        self.flags_value().contains(BundleFlags::VALID_STRICT_SEMANTICS)
    }

    /// The milestone index encoded in the tail transaction's tag. Decoded
    /// once.
    pub fn milestone_index(&self, tangle: &Tangle) -> MilestoneIndex {
        let mut milestone_index = self.milestone_index.lock().unwrap();

        match *milestone_index {
            Some(index) => index,
            None => {
                let cached_tail = load_bundle_tx_or_panic(tangle, self.tail_hash(), &self.hash);
                let index = MilestoneIndex(cached_tail.transaction().tag() as u32);
                cached_tail.release(true);

                *milestone_index = Some(index);
                index
            }
        }
    }

    /// Marks all addresses this bundle spends from as spent and fires
    /// `AddressSpent` for each.
    pub fn apply_spent_addresses(&self, tangle: &Tangle) {
        if self.is_value_spam() {
            return;
        }

        let spent_addresses_enabled = tangle
            .get_snapshot_info()
            .map_or(true, |info| info.spent_addresses_enabled());

        for (address, change) in &self.ledger_changes {
            if *change < 0 {
                if spent_addresses_enabled {
                    tangle.mark_address_as_spent(*address);
                }
                tangle.bus().dispatch(AddressSpent(*address));
            }
        }
    }

    fn ensure_validated(&self, tangle: &Tangle) {
        let mut validated = self.validated.lock().unwrap();

        if *validated {
            return;
        }

        self.validate(tangle);
        *validated = true;
    }

    /// Runs semantic and strict-semantic validation. The bundle is complete
    /// when this is called, so every member transaction has to exist; a
    /// missing one means the store is corrupted.
    fn validate(&self, tangle: &Tangle) {
        let mut ordered = Vec::with_capacity(self.last_index as usize + 1);
        let mut current = *self.tail_hash();

        for _ in 0..=self.last_index {
            let cached_tx = load_bundle_tx_or_panic(tangle, &current, &self.hash);
            ordered.push(cached_tx.transaction().clone());
            current = *cached_tx.transaction().trunk();
            cached_tx.release(true);
        }

        if !semantically_valid(&ordered) {
            return;
        }

        // Safe to unwrap: ordered holds last_index + 1 >= 1 transactions.
        let head = ordered.last().unwrap();
        let mut strict = true;

        // Milestones already follow the strict rules by construction and are
        // exempt from the checks; notably their approvees may not be solid
        // yet.
        if !self.is_milestone() {
            // Non-head transactions must approve the head's trunk as their
            // branch.
            for tx in &ordered[..ordered.len() - 1] {
                if tx.branch() != head.trunk() {
                    strict = false;
                    break;
                }
            }

            // The head must only approve tail transactions.
            if strict {
                let mut approvees = vec![*head.trunk()];
                if head.branch() != head.trunk() {
                    approvees.push(*head.branch());
                }

                for approvee in approvees {
                    if tangle.solid_entry_points_contain(&approvee) {
                        continue;
                    }

                    let cached_metadata = load_bundle_tx_metadata_or_panic(tangle, &approvee, &self.hash);
                    let is_tail = cached_metadata.is_tail();
                    cached_metadata.release(true);

                    if !is_tail {
                        strict = false;
                        break;
                    }
                }
            }
        }

        self.modify_flag(BundleFlags::VALID, true);
        self.modify_flag(BundleFlags::VALID_STRICT_SEMANTICS, strict);
    }
}

/// The semantic bundle validator primitive: index chain, shared bundle hash
/// and a zero value sum. Signature validation is delegated to the signing
/// primitives consumed by the node.
fn semantically_valid(transactions: &[Transaction]) -> bool {
    let last_index = match transactions.last() {
        Some(last) => last.last_index(),
        None => return false,
    };

    if transactions.len() as u64 != last_index + 1 {
        return false;
    }

    let bundle_hash = transactions[0].bundle();
    let mut sum: i64 = 0;

    for (index, tx) in transactions.iter().enumerate() {
        if tx.index() != index as u64 || tx.last_index() != last_index || tx.bundle() != bundle_hash {
            return false;
        }

        sum = match sum.checked_add(tx.value()) {
            Some(sum) => sum,
            None => return false,
        };
    }

    sum == 0
}

impl StorableObject for Bundle {
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error> {
        let tail = Hash::from_slice(key)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid bundle key"))?;

        let reader = &mut &bytes[..];

        let hash = Hash::unpack(reader)?;
        let head = Hash::unpack(reader)?;
        let last_index = u64::unpack(reader)?;
        let flags = u8::unpack(reader)?;

        let tx_count = u32::unpack(reader)?;
        let mut txs = HashSet::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            txs.insert(Hash::unpack(reader)?);
        }

        let change_count = u32::unpack(reader)?;
        let mut ledger_changes = HashMap::with_capacity(change_count as usize);
        for _ in 0..change_count {
            let address = Address::unpack(reader)?;
            let change = i64::unpack(reader)?;
            ledger_changes.insert(address, change);
        }

        let validated = BundleFlags::from_bits_truncate(flags).contains(BundleFlags::VALID);

        Ok(Self {
            object_flags: StorableObjectFlags::default(),
            tail,
            hash,
            head,
            last_index,
            txs,
            ledger_changes,
            flags: AtomicU8::new(flags),
            validated: Mutex::new(validated),
            milestone_index: Mutex::new(None),
        })
    }

    fn object_key(&self) -> Vec<u8> {
        self.tail.as_bytes().to_vec()
    }

    fn object_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        // Safe to unwrap: packing into a vector cannot fail.
        self.hash.pack(&mut bytes).unwrap();
        self.head.pack(&mut bytes).unwrap();
        self.last_index.pack(&mut bytes).unwrap();
        self.flags.load(Ordering::SeqCst).pack(&mut bytes).unwrap();

        (self.txs.len() as u32).pack(&mut bytes).unwrap();
        for tx in &self.txs {
            tx.pack(&mut bytes).unwrap();
        }

        (self.ledger_changes.len() as u32).pack(&mut bytes).unwrap();
        for (address, change) in &self.ledger_changes {
            address.pack(&mut bytes).unwrap();
            change.pack(&mut bytes).unwrap();
        }

        bytes
    }

    fn is_modified(&self) -> bool {
        self.object_flags.is_modified()
    }

    fn set_modified(&self, modified: bool) {
        self.object_flags.set_modified(modified);
    }
}

fn load_bundle_tx_or_panic(tangle: &Tangle, tx_hash: &Hash, bundle_hash: &Hash) -> CachedTransaction {
    tangle.get_transaction(tx_hash).unwrap_or_else(|| {
        panic!(
            "Bundle {} has a reference to a non persisted transaction: {}",
            bundle_hash, tx_hash
        )
    })
}

fn load_bundle_tx_metadata_or_panic(tangle: &Tangle, tx_hash: &Hash, bundle_hash: &Hash) -> CachedMetadata {
    tangle.get_metadata(tx_hash).unwrap_or_else(|| {
        panic!(
            "Bundle {} has a reference to a non persisted transaction: {}",
            bundle_hash, tx_hash
        )
    })
}

/// Tries to assemble the bundles the freshly stored transaction could have
/// completed: the bundle of which it is the tail, or bundles whose tails
/// reach it along same-bundle trunk edges.
pub(crate) fn try_construct_bundles(tangle: &Tangle, hash: Hash) {
    let (bundle_hash, is_tail) = match tangle.get_metadata(&hash) {
        Some(cached_metadata) => {
            let info = (*cached_metadata.bundle(), cached_metadata.is_tail());
            cached_metadata.release(false);
            info
        }
        None => return,
    };

    let mut candidate_tails = Vec::new();

    if is_tail {
        candidate_tails.push(hash);
    } else {
        // Climb towards the tail along inverse trunk edges within the same
        // bundle.
        let mut queue = vec![hash];
        let mut visited = HashSet::new();
        visited.insert(hash);

        while let Some(current) = queue.pop() {
            for approver in tangle.get_approvers(&current) {
                if !visited.insert(approver) {
                    continue;
                }

                if let Some(cached_metadata) = tangle.get_metadata(&approver) {
                    if cached_metadata.bundle() == &bundle_hash && cached_metadata.trunk() == &current {
                        if cached_metadata.is_tail() {
                            candidate_tails.push(approver);
                        } else {
                            queue.push(approver);
                        }
                    }
                    cached_metadata.release(false);
                }
            }
        }
    }

    for tail in candidate_tails {
        try_construct_bundle(tangle, tail);
    }
}

fn try_construct_bundle(tangle: &Tangle, tail: Hash) {
    if tangle.contains_bundle(&tail) {
        return;
    }

    let cached_tail = match tangle.get_transaction(&tail) {
        Some(cached_tail) => cached_tail,
        None => return,
    };

    let tail_tx = cached_tail.transaction();
    let bundle_hash = *tail_tx.bundle();
    let last_index = tail_tx.last_index();
    let tail_address = *tail_tx.address();
    let tail_tag = tail_tx.tag();

    let mut txs = HashSet::new();
    txs.insert(tail);

    let mut ledger_changes: HashMap<Address, i64> = HashMap::new();
    if tail_tx.value() != 0 {
        *ledger_changes.entry(*tail_tx.address()).or_default() += tail_tx.value();
    }

    let mut head = tail;
    let mut current = *tail_tx.trunk();
    cached_tail.release(false);

    for _ in 1..=last_index {
        let cached_tx = match tangle.get_transaction(&current) {
            Some(cached_tx) => cached_tx,
            // Not all members arrived yet; the bundle stays incomplete.
            None => return,
        };

        let tx = cached_tx.transaction();

        if tx.bundle() != &bundle_hash || !txs.insert(current) {
            cached_tx.release(false);
            return;
        }

        if tx.value() != 0 {
            *ledger_changes.entry(*tx.address()).or_default() += tx.value();
        }

        head = current;
        current = *tx.trunk();
        cached_tx.release(false);
    }

    if txs.len() as u64 != last_index + 1 {
        return;
    }

    let is_value_spam = ledger_changes.values().all(|change| *change == 0);
    let is_milestone = tail_address == *tangle.coordinator_address();

    let bundle = Bundle::new(
        tail,
        bundle_hash,
        head,
        last_index,
        txs,
        ledger_changes,
        is_value_spam,
        is_milestone,
    );

    let (cached_bundle, was_new) = tangle.bundles.store_if_absent(bundle);

    if was_new && is_milestone {
        let index = MilestoneIndex(tail_tag as u32);

        for tx_hash in cached_bundle.transaction_hashes() {
            if let Some(cached_metadata) = tangle.get_metadata(&tx_hash) {
                cached_metadata.set_milestone(true);
                cached_metadata.release(false);
            }
        }

        let (cached_milestone, _) = tangle.store_milestone(index, tail);
        cached_milestone.release(false);
        tangle.update_latest_milestone_index(index);
    }

    cached_bundle.release(false);
}
