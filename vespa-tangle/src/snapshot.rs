// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The local snapshot file and the persisted snapshot info record.

use crate::{AbortSignal, Error, Tangle};

use vespa_bundle::{Address, Hash, MilestoneIndex};
use vespa_common::packable::{Packable, Read, Write};

use log::info;

use std::{fs::File, io::BufReader, io::BufWriter, path::Path};

const SNAPSHOT_MAGIC: u32 = 0x5645_5350;
const SNAPSHOT_VERSION: u8 = 1;

/// The well-known record describing the snapshot the database was started
/// from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotInfo {
    coordinator_address: Address,
    snapshot_index: MilestoneIndex,
    pruning_index: MilestoneIndex,
    timestamp: u64,
    spent_addresses_enabled: bool,
}

impl SnapshotInfo {
    /// Creates a snapshot info record.
    pub fn new(
        coordinator_address: Address,
        snapshot_index: MilestoneIndex,
        pruning_index: MilestoneIndex,
        timestamp: u64,
        spent_addresses_enabled: bool,
    ) -> Self {
        Self {
            coordinator_address,
            snapshot_index,
            pruning_index,
            timestamp,
            spent_addresses_enabled,
        }
    }

    /// The coordinator address the network is trusted on.
    pub fn coordinator_address(&self) -> &Address {
        &self.coordinator_address
    }

    /// The milestone index of the snapshot.
    pub fn snapshot_index(&self) -> MilestoneIndex {
        self.snapshot_index
    }

    /// The milestone index everything below which was pruned.
    pub fn pruning_index(&self) -> MilestoneIndex {
        self.pruning_index
    }

    /// Unix timestamp of the snapshot.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Whether spent addresses are tracked.
    pub fn spent_addresses_enabled(&self) -> bool {
        self.spent_addresses_enabled
    }
}

impl Packable for SnapshotInfo {
    type Error = std::io::Error;

    fn packed_len(&self) -> usize {
        self.coordinator_address.packed_len() + 2 * 4 + 8 + 1
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.coordinator_address.pack(writer)?;
        self.snapshot_index.pack(writer)?;
        self.pruning_index.pack(writer)?;
        self.timestamp.pack(writer)?;
        self.spent_addresses_enabled.pack(writer)
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        Ok(Self {
            coordinator_address: Address::unpack(reader)?,
            snapshot_index: MilestoneIndex::unpack(reader)?,
            pruning_index: MilestoneIndex::unpack(reader)?,
            timestamp: u64::unpack(reader)?,
            spent_addresses_enabled: bool::unpack(reader)?,
        })
    }
}

/// A local snapshot: the pruning boundary of the tangle, its solid entry
/// points and the spent addresses seen so far.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    pruning_index: MilestoneIndex,
    solid_entry_points: Vec<(Hash, MilestoneIndex)>,
    spent_addresses: Vec<Address>,
}

impl LocalSnapshot {
    /// Creates a local snapshot.
    pub fn new(
        pruning_index: MilestoneIndex,
        solid_entry_points: Vec<(Hash, MilestoneIndex)>,
        spent_addresses: Vec<Address>,
    ) -> Self {
        Self {
            pruning_index,
            solid_entry_points,
            spent_addresses,
        }
    }

    /// The pruning milestone index of the snapshot.
    pub fn pruning_index(&self) -> MilestoneIndex {
        self.pruning_index
    }

    /// The solid entry points of the snapshot.
    pub fn solid_entry_points(&self) -> &[(Hash, MilestoneIndex)] {
        &self.solid_entry_points
    }

    /// The spent addresses of the snapshot.
    pub fn spent_addresses(&self) -> &[Address] {
        &self.spent_addresses
    }

    /// Reads a snapshot from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut reader = BufReader::new(File::open(path)?);

        Self::unpack(&mut reader).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Writes the snapshot to a file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);

        self.pack(&mut writer)?;

        Ok(())
    }

    /// Applies the snapshot to a freshly created tangle: initializes the
    /// solid entry point set and seeds the spent addresses.
    pub fn apply(&self, tangle: &Tangle) {
        tangle.init_solid_entry_points();

        for (hash, index) in &self.solid_entry_points {
            tangle.add_solid_entry_point(*hash, *index);
        }

        for address in &self.spent_addresses {
            tangle.mark_address_as_spent(*address);
        }

        info!(
            "Applied snapshot with pruning index {}, {} solid entry points and {} spent addresses.",
            self.pruning_index,
            self.solid_entry_points.len(),
            self.spent_addresses.len()
        );
    }
}

impl Packable for LocalSnapshot {
    type Error = std::io::Error;

    fn packed_len(&self) -> usize {
        4 + 1
            + 4
            + 4
            + self.solid_entry_points.len() * (vespa_bundle::HASH_LENGTH + 4)
            + 4
            + self.spent_addresses.len() * vespa_bundle::HASH_LENGTH
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        SNAPSHOT_MAGIC.pack(writer)?;
        SNAPSHOT_VERSION.pack(writer)?;
        self.pruning_index.pack(writer)?;

        (self.solid_entry_points.len() as u32).pack(writer)?;
        for (hash, index) in &self.solid_entry_points {
            hash.pack(writer)?;
            index.pack(writer)?;
        }

        (self.spent_addresses.len() as u32).pack(writer)?;
        for address in &self.spent_addresses {
            address.pack(writer)?;
        }

        Ok(())
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        let magic = u32::unpack(reader)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "invalid snapshot magic",
            ));
        }

        let version = u8::unpack(reader)?;
        if version != SNAPSHOT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unsupported snapshot version",
            ));
        }

        let pruning_index = MilestoneIndex::unpack(reader)?;

        let entry_point_count = u32::unpack(reader)?;
        let mut solid_entry_points = Vec::with_capacity(entry_point_count as usize);
        for _ in 0..entry_point_count {
            let hash = Hash::unpack(reader)?;
            let index = MilestoneIndex::unpack(reader)?;
            solid_entry_points.push((hash, index));
        }

        let spent_address_count = u32::unpack(reader)?;
        let mut spent_addresses = Vec::with_capacity(spent_address_count as usize);
        for _ in 0..spent_address_count {
            spent_addresses.push(Address::unpack(reader)?);
        }

        Ok(Self {
            pruning_index,
            solid_entry_points,
            spent_addresses,
        })
    }
}

/// Exports the current pruning boundary, solid entry points and spent
/// addresses of the tangle, honoring the abort channel between steps.
pub fn export_snapshot(tangle: &Tangle, abort: Option<&AbortSignal>) -> Result<LocalSnapshot, Error> {
    let aborted = |abort: Option<&AbortSignal>| match abort {
        Some(abort) => abort.try_recv() != Err(flume::TryRecvError::Empty),
        None => false,
    };

    let solid_entry_points =
        tangle.with_solid_entry_points(|points| points.iter().map(|(h, i)| (*h, *i)).collect::<Vec<_>>());

    let mut spent_addresses = Vec::new();
    let mut was_aborted = false;

    tangle.for_each_spent_address(|address| {
        if aborted(abort) {
            was_aborted = true;
            return false;
        }

        spent_addresses.push(*address);
        true
    });

    if was_aborted || aborted(abort) {
        return Err(Error::OperationAborted);
    }

    let pruning_index = tangle
        .get_snapshot_info()
        .map(|info| info.pruning_index())
        .unwrap_or_default();

    Ok(LocalSnapshot::new(pruning_index, solid_entry_points, spent_addresses))
}
