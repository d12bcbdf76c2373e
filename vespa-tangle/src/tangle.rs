// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    approvers::Approvers,
    bundle::{self, Bundle},
    config::TangleConfig,
    event::{ProcessedTransaction, SolidMilestoneIndexChanged},
    metadata::TransactionMetadata,
    milestone::MilestoneObject,
    snapshot::SnapshotInfo,
    solid_entry_points::SolidEntryPoints,
    solidifier,
    spent_address::SpentAddress,
    transaction::StoredTransaction,
};

use vespa_bundle::{Address, Hash, MilestoneIndex, Transaction};
use vespa_common::{event::Bus, packable::Packable};
use vespa_storage::{CachedObject, ObjectStorage, ObjectStorageOptions, StorageBackend};

use log::info;

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex, RwLock,
};

/// Realm prefix of the transaction repository.
pub const STORE_PREFIX_TRANSACTIONS: u8 = 0;
/// Realm prefix of the transaction metadata repository.
pub const STORE_PREFIX_METADATA: u8 = 1;
/// Realm prefix of the approvers repository.
pub const STORE_PREFIX_APPROVERS: u8 = 2;
/// Realm prefix of the bundle repository.
pub const STORE_PREFIX_BUNDLES: u8 = 3;
/// Realm prefix of the milestone repository.
pub const STORE_PREFIX_MILESTONES: u8 = 4;
/// Realm prefix of the spent address repository.
pub const STORE_PREFIX_SPENT_ADDRESSES: u8 = 5;
/// Realm prefix (and full key) of the snapshot info record.
pub const STORE_PREFIX_SNAPSHOT_INFO: u8 = 6;

/// How many milestones the solid milestone index may lag behind the latest
/// one for the node to still count as synced.
const SYNC_THRESHOLD: u32 = 2;

/// A handle to a stored transaction.
pub type CachedTransaction = CachedObject<StoredTransaction>;
/// A handle to a transaction's metadata.
pub type CachedMetadata = CachedObject<TransactionMetadata>;
/// A handle to a bundle.
pub type CachedBundle = CachedObject<Bundle>;
/// A handle to a milestone entry.
pub type CachedMilestone = CachedObject<MilestoneObject>;

/// The tangle context: every repository, the solid entry point set, the
/// milestone indices and the event bus, threaded explicitly through all
/// components instead of living in process-wide singletons.
pub struct Tangle {
    pub(crate) transactions: ObjectStorage<StoredTransaction>,
    pub(crate) metadata: ObjectStorage<TransactionMetadata>,
    pub(crate) approvers: ObjectStorage<Approvers>,
    pub(crate) bundles: ObjectStorage<Bundle>,
    pub(crate) milestones: ObjectStorage<MilestoneObject>,
    pub(crate) spent_addresses: ObjectStorage<SpentAddress>,
    spent_addresses_lock: RwLock<()>,
    solid_entry_points: RwLock<Option<SolidEntryPoints>>,
    snapshot_info: Mutex<Option<SnapshotInfo>>,
    backend: Arc<dyn StorageBackend>,
    bus: Arc<Bus<'static>>,
    config: TangleConfig,
    solid_milestone_index: AtomicU32,
    latest_milestone_index: AtomicU32,
}

impl Tangle {
    /// Creates a tangle over the given backend. The solid entry point set
    /// starts uninitialized; it is populated by a snapshot import or by
    /// [`init_solid_entry_points`](Self::init_solid_entry_points).
    pub fn new(backend: Arc<dyn StorageBackend>, config: TangleConfig, bus: Arc<Bus<'static>>) -> Self {
        let options = |prefix: u8| {
            let mut options = ObjectStorageOptions::new(prefix, config.cache_time);
            if let Some(leak) = &config.leak_detection {
                options = options.with_leak_detection(leak.clone());
            }
            options
        };

        let snapshot_info = backend
            .fetch(&[STORE_PREFIX_SNAPSHOT_INFO])
            .unwrap_or_else(|e| panic!("Fetching the snapshot info failed: {}", e))
            .map(|bytes| {
                SnapshotInfo::unpack(&mut bytes.as_slice())
                    .unwrap_or_else(|e| panic!("The stored snapshot info is corrupted: {}", e))
            });

        Self {
            transactions: ObjectStorage::new(backend.clone(), options(STORE_PREFIX_TRANSACTIONS)),
            metadata: ObjectStorage::new(backend.clone(), options(STORE_PREFIX_METADATA)),
            approvers: ObjectStorage::new(backend.clone(), options(STORE_PREFIX_APPROVERS)),
            bundles: ObjectStorage::new(backend.clone(), options(STORE_PREFIX_BUNDLES)),
            milestones: ObjectStorage::new(
                backend.clone(),
                options(STORE_PREFIX_MILESTONES).with_store_on_create(true),
            ),
            spent_addresses: ObjectStorage::new(
                backend.clone(),
                options(STORE_PREFIX_SPENT_ADDRESSES)
                    .with_keys_only(true)
                    .with_store_on_create(true),
            ),
            spent_addresses_lock: RwLock::new(()),
            solid_entry_points: RwLock::new(None),
            snapshot_info: Mutex::new(snapshot_info),
            backend,
            bus,
            config,
            solid_milestone_index: AtomicU32::new(0),
            latest_milestone_index: AtomicU32::new(0),
        }
    }

    /// The event bus all tangle events are dispatched on.
    pub fn bus(&self) -> &Bus<'static> {
        &self.bus
    }

    /// The address milestone bundles are recognized by.
    pub fn coordinator_address(&self) -> &Address {
        self.config.coordinator_address()
    }

    /// Whether the database holds data without a snapshot info record. Such a
    /// database was not started from a snapshot and must not be trusted.
    pub fn is_database_tainted(&self) -> bool {
        if self.snapshot_info.lock().unwrap().is_some() {
            return false;
        }

        let mut has_data = false;
        self.backend
            .iter_prefix(&[], &mut |_, _| {
                has_data = true;
                false
            })
            .unwrap_or_else(|e| panic!("Inspecting the database failed: {}", e));

        has_data
    }

    /// Flushes and shuts down every repository, reporting leaked handles.
    pub fn shutdown(&self) {
        self.transactions.shutdown();
        self.metadata.shutdown();
        self.approvers.shutdown();
        self.bundles.shutdown();
        self.milestones.shutdown();
        self.spent_addresses.shutdown();

        info!("Tangle storages shut down.");
    }

    // Transactions and metadata.

    /// Stores a transaction if absent; on first insertion the metadata and
    /// approver repositories are updated, `ProcessedTransaction` fires, the
    /// transaction's bundle is assembled if it just became complete, and
    /// solidity is propagated.
    pub fn store_transaction_if_absent(&self, transaction: Transaction) -> (CachedTransaction, bool) {
        let hash = transaction.hash();
        let trunk = *transaction.trunk();
        let branch = *transaction.branch();
        let bundle = *transaction.bundle();
        let is_tail = transaction.is_tail();

        let (cached_transaction, was_new) = self
            .transactions
            .store_if_absent(StoredTransaction::new(hash, transaction));

        if !was_new {
            return (cached_transaction, false);
        }

        let (cached_metadata, _) = self
            .metadata
            .store_if_absent(TransactionMetadata::new(hash, trunk, branch, bundle, is_tail));
        cached_metadata.release(false);

        self.add_approver(trunk, hash);
        if branch != trunk {
            self.add_approver(branch, hash);
        }

        self.bus.dispatch(ProcessedTransaction(hash));

        bundle::try_construct_bundles(self, hash);
        solidifier::propagate_solid_cone(self, hash);

        (cached_transaction, true)
    }

    fn add_approver(&self, approvee: Hash, approver: Hash) {
        let (cached, _) = self.approvers.store_if_absent(Approvers::new(approvee));
        cached.add(approver);
        cached.release(false);
    }

    /// Loads a transaction.
    pub fn get_transaction(&self, hash: &Hash) -> Option<CachedTransaction> {
        self.transactions.load(hash.as_bytes())
    }

    /// Whether a transaction is stored.
    pub fn contains_transaction(&self, hash: &Hash) -> bool {
        self.transactions.contains(hash.as_bytes())
    }

    /// Loads a transaction's metadata.
    pub fn get_metadata(&self, hash: &Hash) -> Option<CachedMetadata> {
        self.metadata.load(hash.as_bytes())
    }

    /// The hashes of all transactions approving the given one. Unordered.
    pub fn get_approvers(&self, hash: &Hash) -> Vec<Hash> {
        match self.approvers.load(hash.as_bytes()) {
            Some(cached) => {
                let approvers = cached.collect();
                cached.release(false);
                approvers
            }
            None => Vec::new(),
        }
    }

    // Bundles.

    /// Loads the bundle with the given tail transaction.
    pub fn get_bundle(&self, tail: &Hash) -> Option<CachedBundle> {
        self.bundles.load(tail.as_bytes())
    }

    /// Whether a bundle with the given tail transaction is stored.
    pub fn contains_bundle(&self, tail: &Hash) -> bool {
        self.bundles.contains(tail.as_bytes())
    }

    // Milestones.

    /// Stores a milestone entry.
    pub fn store_milestone(&self, index: MilestoneIndex, tail: Hash) -> (CachedMilestone, bool) {
        self.milestones.store_if_absent(MilestoneObject::new(index, tail))
    }

    /// The tail transaction of the milestone with the given index.
    pub fn get_milestone_hash(&self, index: MilestoneIndex) -> Option<Hash> {
        let cached = self.milestones.load(&index.0.to_be_bytes())?;
        let tail = *cached.tail();
        cached.release(false);

        Some(tail)
    }

    /// Whether the milestone with the given index is stored.
    pub fn contains_milestone(&self, index: MilestoneIndex) -> bool {
        self.milestones.contains(&index.0.to_be_bytes())
    }

    /// The latest solid milestone index.
    pub fn get_solid_milestone_index(&self) -> MilestoneIndex {
        MilestoneIndex(self.solid_milestone_index.load(Ordering::SeqCst))
    }

    /// Advances the solid milestone index; fires
    /// `SolidMilestoneIndexChanged` when it actually moved forward.
    pub fn update_solid_milestone_index(&self, index: MilestoneIndex) {
        let previous = self.solid_milestone_index.fetch_max(index.0, Ordering::SeqCst);
        if previous < index.0 {
            self.bus.dispatch(SolidMilestoneIndexChanged(index));
        }
    }

    /// The latest known milestone index.
    pub fn get_latest_milestone_index(&self) -> MilestoneIndex {
        MilestoneIndex(self.latest_milestone_index.load(Ordering::SeqCst))
    }

    /// Advances the latest known milestone index.
    pub fn update_latest_milestone_index(&self, index: MilestoneIndex) {
        self.latest_milestone_index.fetch_max(index.0, Ordering::SeqCst);
    }

    /// Whether the solid milestone caught up with the latest one.
    pub fn is_synced(&self) -> bool {
        self.solid_milestone_index.load(Ordering::SeqCst) >= self.latest_milestone_index.load(Ordering::SeqCst)
    }

    /// Like [`is_synced`](Self::is_synced), allowing a small lag.
    pub fn is_synced_with_threshold(&self) -> bool {
        self.solid_milestone_index.load(Ordering::SeqCst) + SYNC_THRESHOLD
            >= self.latest_milestone_index.load(Ordering::SeqCst)
    }

    // Solid entry points.

    /// Initializes an empty solid entry point set. Initializing twice is a
    /// programming error.
    pub fn init_solid_entry_points(&self) {
        let mut guard = self.solid_entry_points.write().unwrap();

        if guard.is_some() {
            panic!("Solid entry points already initialized.");
        }

        *guard = Some(SolidEntryPoints::new());
    }

    /// Whether the hash is a solid entry point.
    pub fn solid_entry_points_contain(&self, hash: &Hash) -> bool {
        self.solid_entry_points
            .read()
            .unwrap()
            .as_ref()
            .expect("Solid entry points not initialized.")
            .contains(hash)
    }

    /// The milestone index of a solid entry point.
    pub fn solid_entry_point_index(&self, hash: &Hash) -> Option<MilestoneIndex> {
        self.solid_entry_points
            .read()
            .unwrap()
            .as_ref()
            .expect("Solid entry points not initialized.")
            .index(hash)
    }

    /// Adds a solid entry point.
    pub fn add_solid_entry_point(&self, hash: Hash, index: MilestoneIndex) {
        self.solid_entry_points
            .write()
            .unwrap()
            .as_mut()
            .expect("Solid entry points not initialized.")
            .add(hash, index);
    }

    /// Removes all solid entry points, keeping the set initialized.
    pub fn reset_solid_entry_points(&self) {
        self.solid_entry_points
            .write()
            .unwrap()
            .as_mut()
            .expect("Solid entry points not initialized.")
            .clear();
    }

    /// Runs the visitor under the read lock of the solid entry point set.
    pub fn with_solid_entry_points<R>(&self, visitor: impl FnOnce(&SolidEntryPoints) -> R) -> R {
        visitor(
            self.solid_entry_points
                .read()
                .unwrap()
                .as_ref()
                .expect("Solid entry points not initialized."),
        )
    }

    // Spent addresses.

    /// Whether the address was ever spent from.
    pub fn was_address_spent_from(&self, address: &Address) -> bool {
        self.spent_addresses.contains(address.as_bytes())
    }

    /// Marks an address as spent; returns whether it was not marked before.
    pub fn mark_address_as_spent(&self, address: Address) -> bool {
        let _guard = self.spent_addresses_lock.write().unwrap();

        let (cached, was_new) = self.spent_addresses.store_if_absent(SpentAddress::new(address));
        cached.release(true);

        was_new
    }

    /// Runs the visitor over all spent addresses under the read lock, until
    /// it returns `false`.
    pub fn for_each_spent_address(&self, mut visitor: impl FnMut(&Address) -> bool) {
        let _guard = self.spent_addresses_lock.read().unwrap();

        self.spent_addresses.for_each_key_only(|key| match Address::from_slice(key) {
            Some(address) => visitor(&address),
            None => true,
        });
    }

    // Snapshot info.

    /// The stored snapshot info, if any.
    pub fn get_snapshot_info(&self) -> Option<SnapshotInfo> {
        self.snapshot_info.lock().unwrap().clone()
    }

    /// Stores and persists the snapshot info.
    pub fn set_snapshot_info(&self, info: SnapshotInfo) {
        // Safe to unwrap: packing into a vector cannot fail.
        let bytes = info.pack_new().unwrap();

        self.backend
            .insert(&[STORE_PREFIX_SNAPSHOT_INFO], &bytes)
            .unwrap_or_else(|e| panic!("Persisting the snapshot info failed: {}", e));

        *self.snapshot_info.lock().unwrap() = Some(info);
    }
}
