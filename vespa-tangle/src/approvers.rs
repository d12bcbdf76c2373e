// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, HASH_LENGTH};
use vespa_storage::{StorableObject, StorableObjectFlags};

use std::sync::RwLock;

/// The inverse trunk/branch edges of one transaction: the set of transactions
/// approving it. Persisted as the concatenation of the approver hashes.
pub struct Approvers {
    object_flags: StorableObjectFlags,
    hash: Hash,
    approvers: RwLock<Vec<Hash>>,
}

impl Approvers {
    pub(crate) fn new(hash: Hash) -> Self {
        Self {
            object_flags: StorableObjectFlags::default(),
            hash,
            approvers: RwLock::new(Vec::new()),
        }
    }

    /// The hash of the approved transaction.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Adds an approver; returns whether it was not present before.
    pub(crate) fn add(&self, approver: Hash) -> bool {
        let mut approvers = self.approvers.write().unwrap();

        if approvers.contains(&approver) {
            return false;
        }

        approvers.push(approver);
        self.object_flags.set_modified(true);

        true
    }

    /// The current set of approvers. Unordered.
    pub fn collect(&self) -> Vec<Hash> {
        self.approvers.read().unwrap().clone()
    }

    /// Number of approvers.
    pub fn len(&self) -> usize {
        self.approvers.read().unwrap().len()
    }

    /// Whether no approver is known.
    pub fn is_empty(&self) -> bool {
        self.approvers.read().unwrap().is_empty()
    }
}

impl StorableObject for Approvers {
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error> {
        let hash = Hash::from_slice(key)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid approvers key"))?;

        if bytes.len() % HASH_LENGTH != 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "approver list length is not a multiple of the hash length",
            ));
        }

        let approvers = bytes
            .chunks(HASH_LENGTH)
            // Safe to unwrap: chunk length was just checked.
            .map(|chunk| Hash::from_slice(chunk).unwrap())
            .collect();

        Ok(Self {
            object_flags: StorableObjectFlags::default(),
            hash,
            approvers: RwLock::new(approvers),
        })
    }

    fn object_key(&self) -> Vec<u8> {
        self.hash.as_bytes().to_vec()
    }

    fn object_bytes(&self) -> Vec<u8> {
        let approvers = self.approvers.read().unwrap();
        let mut bytes = Vec::with_capacity(approvers.len() * HASH_LENGTH);

        for approver in approvers.iter() {
            bytes.extend_from_slice(approver.as_bytes());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_deduplicates() {
        let approvers = Approvers::new(Hash::new([1u8; HASH_LENGTH]));
        let approver = Hash::new([2u8; HASH_LENGTH]);

        assert!(approvers.add(approver));
        assert!(!approvers.add(approver));
        assert_eq!(approvers.len(), 1);
    }

    #[test]
    fn concatenated_round_trip() {
        let approvers = Approvers::new(Hash::new([1u8; HASH_LENGTH]));
        approvers.add(Hash::new([2u8; HASH_LENGTH]));
        approvers.add(Hash::new([3u8; HASH_LENGTH]));

        let restored = Approvers::from_key_and_bytes(&approvers.object_key(), &approvers.object_bytes()).unwrap();

        assert_eq!(restored.collect(), approvers.collect());
    }

    #[test]
    fn truncated_value_is_rejected() {
        assert!(Approvers::from_key_and_bytes(&[1u8; HASH_LENGTH], &[0u8; HASH_LENGTH + 1]).is_err());
    }
}
