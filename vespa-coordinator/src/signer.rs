// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Address, Hash, MilestoneIndex};

/// The milestone signing primitive.
///
/// The actual Merkle key tree and signature scheme are external to the node
/// core; the coordinator only relies on a stable address and deterministic
/// signatures over the milestone essence.
pub trait MilestoneSigner: Send + Sync {
    /// The address milestones are issued from, the root of the key tree.
    fn address(&self) -> Address;

    /// Signs the essence of the milestone with the given index.
    fn sign(&self, index: MilestoneIndex, essence: &[u8]) -> Result<Vec<u8>, String>;
}

/// A seed-keyed signer standing in for the Merkle tree scheme. The address
/// is derived from the seed and the tree depth; signatures are keyed digests
/// of the essence.
pub struct KeyedSigner {
    seed: Hash,
    merkle_tree_depth: u8,
    security_level: u8,
}

impl KeyedSigner {
    /// Creates a signer from a seed.
    pub fn new(seed: Hash, merkle_tree_depth: u8, security_level: u8) -> Self {
        Self {
            seed,
            merkle_tree_depth,
            security_level,
        }
    }

    /// The number of signature transactions per milestone.
    pub fn security_level(&self) -> u8 {
        self.security_level
    }
}

impl MilestoneSigner for KeyedSigner {
    fn address(&self) -> Address {
        let mut bytes = self.seed.as_bytes().to_vec();
        bytes.push(self.merkle_tree_depth);

        Hash::digest(&bytes)
    }

    fn sign(&self, index: MilestoneIndex, essence: &[u8]) -> Result<Vec<u8>, String> {
        let mut bytes = self.seed.as_bytes().to_vec();
        bytes.extend_from_slice(&index.0.to_be_bytes());
        bytes.extend_from_slice(essence);

        Ok(Hash::digest(&bytes).as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vespa_bundle::HASH_LENGTH;

    #[test]
    fn address_is_stable_and_seed_bound() {
        let a = KeyedSigner::new(Hash::new([1u8; HASH_LENGTH]), 23, 2);
        let b = KeyedSigner::new(Hash::new([2u8; HASH_LENGTH]), 23, 2);

        assert_eq!(a.address(), a.address());
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn signatures_differ_per_index() {
        let signer = KeyedSigner::new(Hash::new([1u8; HASH_LENGTH]), 23, 2);

        assert_ne!(
            signer.sign(MilestoneIndex(1), b"essence").unwrap(),
            signer.sign(MilestoneIndex(2), b"essence").unwrap()
        );
    }
}
