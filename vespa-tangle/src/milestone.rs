// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_common::packable::Packable;
use vespa_storage::{StorableObject, StorableObjectFlags};

/// A milestone entry: maps a milestone index to the tail transaction of its
/// bundle. Keyed by the 4-byte big-endian index so entries iterate in order.
pub struct MilestoneObject {
    object_flags: StorableObjectFlags,
    index: MilestoneIndex,
    tail: Hash,
}

impl MilestoneObject {
    pub(crate) fn new(index: MilestoneIndex, tail: Hash) -> Self {
        Self {
            object_flags: StorableObjectFlags::default(),
            index,
            tail,
        }
    }

    /// The milestone index.
    pub fn index(&self) -> MilestoneIndex {
        self.index
    }

    /// The tail transaction of the milestone bundle.
    pub fn tail(&self) -> &Hash {
        &self.tail
    }
}

impl StorableObject for MilestoneObject {
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error> {
        let index: [u8; 4] = key
            .try_into()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid milestone key"))?;
        let tail = Hash::unpack(&mut &bytes[..])?;

        Ok(Self::new(MilestoneIndex(u32::from_be_bytes(index)), tail))
    }

    fn object_key(&self) -> Vec<u8> {
        self.index.0.to_be_bytes().to_vec()
    }

    fn object_bytes(&self) -> Vec<u8> {
        self.tail.as_bytes().to_vec()
    }

    fn is_modified(&self) -> bool {
        self.object_flags.is_modified()
    }

    fn set_modified(&self, modified: bool) {
        self.object_flags.set_modified(modified);
    }
}
