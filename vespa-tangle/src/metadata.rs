// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_common::packable::Packable;
use vespa_storage::{StorableObject, StorableObjectFlags};

use bitflags::bitflags;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

bitflags! {
    /// Flags of a transaction's metadata.
    pub struct TransactionFlags: u8 {
        /// All ancestors of the transaction are known and solid.
        const SOLID = 0b0000_0001;
        /// The transaction is referenced by a milestone.
        const CONFIRMED = 0b0000_0010;
        /// The transaction is part of a conflicting bundle.
        const CONFLICTING = 0b0000_0100;
        /// The transaction belongs to a milestone bundle.
        const MILESTONE = 0b0000_1000;
        /// The transaction is the tail of its bundle.
        const TAIL = 0b0001_0000;
    }
}

/// Sentinel for an unset root snapshot index.
const INDEX_UNSET: u64 = u64::MAX;

/// The mutable companion of a stored transaction, keyed by the same hash.
///
/// The trunk, branch and bundle references are duplicated here so that graph
/// walks never need to load the heavier transaction payload. Flag mutations
/// use atomic bit operations and mark the object modified so the store
/// persists it on release.
pub struct TransactionMetadata {
    object_flags: StorableObjectFlags,
    hash: Hash,
    flags: AtomicU8,
    trunk: Hash,
    branch: Hash,
    bundle: Hash,
    /// Youngest transaction root snapshot index; `INDEX_UNSET` when unknown.
    ytrsi: AtomicU64,
    /// Oldest transaction root snapshot index; `INDEX_UNSET` when unknown.
    otrsi: AtomicU64,
}

impl TransactionMetadata {
    pub(crate) fn new(hash: Hash, trunk: Hash, branch: Hash, bundle: Hash, is_tail: bool) -> Self {
        let flags = if is_tail { TransactionFlags::TAIL } else { TransactionFlags::empty() };

        Self {
            object_flags: StorableObjectFlags::default(),
            hash,
            flags: AtomicU8::new(flags.bits()),
            trunk,
            branch,
            bundle,
            ytrsi: AtomicU64::new(INDEX_UNSET),
            otrsi: AtomicU64::new(INDEX_UNSET),
        }
    }

    /// The hash of the transaction this metadata belongs to.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// The trunk reference of the transaction.
    pub fn trunk(&self) -> &Hash {
        &self.trunk
    }

    /// The branch reference of the transaction.
    pub fn branch(&self) -> &Hash {
        &self.branch
    }

    /// The bundle hash of the transaction.
    pub fn bundle(&self) -> &Hash {
        &self.bundle
    }

    /// The current flag set.
    pub fn flags(&self) -> TransactionFlags {
        TransactionFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    fn modify_flag(&self, flag: TransactionFlags, value: bool) {
        let previous = if value {
            self.flags.fetch_or(flag.bits(), Ordering::SeqCst)
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::SeqCst)
        };

        if (previous & flag.bits() != 0) != value {
            self.object_flags.set_modified(true);
        }
    }

    /// Whether all ancestors are known and solid.
    pub fn is_solid(&self) -> bool {
        self.flags().contains(TransactionFlags::SOLID)
    }

    pub(crate) fn set_solid(&self, solid: bool) {
        self.modify_flag(TransactionFlags::SOLID, solid);
    }

    /// Whether the transaction is referenced by a milestone.
    pub fn is_confirmed(&self) -> bool {
        self.flags().contains(TransactionFlags::CONFIRMED)
    }

    pub(crate) fn set_confirmed(&self, confirmed: bool) {
        self.modify_flag(TransactionFlags::CONFIRMED, confirmed);
    }

    /// Whether the transaction belongs to a conflicting bundle.
    pub fn is_conflicting(&self) -> bool {
        self.flags().contains(TransactionFlags::CONFLICTING)
    }

    /// Marks the transaction as part of a conflicting bundle. Set during
    /// ledger application.
    pub fn set_conflicting(&self, conflicting: bool) {
        self.modify_flag(TransactionFlags::CONFLICTING, conflicting);
    }

    /// Whether the transaction belongs to a milestone bundle.
    pub fn is_milestone(&self) -> bool {
        self.flags().contains(TransactionFlags::MILESTONE)
    }

    pub(crate) fn set_milestone(&self, milestone: bool) {
        self.modify_flag(TransactionFlags::MILESTONE, milestone);
    }

    /// Whether the transaction is the tail of its bundle.
    pub fn is_tail(&self) -> bool {
        self.flags().contains(TransactionFlags::TAIL)
    }

    /// The youngest transaction root snapshot index, if computed.
    pub fn ytrsi(&self) -> Option<MilestoneIndex> {
        match self.ytrsi.load(Ordering::SeqCst) {
            INDEX_UNSET => None,
            index => Some(MilestoneIndex(index as u32)),
        }
    }

    /// The oldest transaction root snapshot index, if computed.
    pub fn otrsi(&self) -> Option<MilestoneIndex> {
        match self.otrsi.load(Ordering::SeqCst) {
            INDEX_UNSET => None,
            index => Some(MilestoneIndex(index as u32)),
        }
    }

    /// Memoizes the root snapshot indexes.
    pub fn set_root_snapshot_indexes(&self, ytrsi: MilestoneIndex, otrsi: MilestoneIndex) {
        self.ytrsi.store(*ytrsi as u64, Ordering::SeqCst);
        self.otrsi.store(*otrsi as u64, Ordering::SeqCst);
        self.object_flags.set_modified(true);
    }
}

impl StorableObject for TransactionMetadata {
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error> {
        let hash = Hash::from_slice(key)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid metadata key"))?;

        let reader = &mut &bytes[..];

        let flags = u8::unpack(reader)?;
        let trunk = Hash::unpack(reader)?;
        let branch = Hash::unpack(reader)?;
        let bundle = Hash::unpack(reader)?;
        let ytrsi = Option::<u32>::unpack(reader)?;
        let otrsi = Option::<u32>::unpack(reader)?;

        Ok(Self {
            object_flags: StorableObjectFlags::default(),
            hash,
            flags: AtomicU8::new(flags),
            trunk,
            branch,
            bundle,
            ytrsi: AtomicU64::new(ytrsi.map_or(INDEX_UNSET, u64::from)),
            otrsi: AtomicU64::new(otrsi.map_or(INDEX_UNSET, u64::from)),
        })
    }

    fn object_key(&self) -> Vec<u8> {
        self.hash.as_bytes().to_vec()
    }

    fn object_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        // Safe to unwrap: packing into a vector cannot fail.
        self.flags.load(Ordering::SeqCst).pack(&mut bytes).unwrap();
        self.trunk.pack(&mut bytes).unwrap();
        self.branch.pack(&mut bytes).unwrap();
        self.bundle.pack(&mut bytes).unwrap();
        self.ytrsi().map(|i| *i).pack(&mut bytes).unwrap();
        self.otrsi().map(|i| *i).pack(&mut bytes).unwrap();

        bytes
    }

    fn is_modified(&self) -> bool {
        self.object_flags.is_modified()
    }

    fn set_modified(&self, modified: bool) {
        self.object_flags.set_modified(modified);
    }
}
