// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, MilestoneIndex};

use std::collections::HashMap;

/// The snapshot-pinned terminal set of the tangle.
///
/// Hashes past the pruning horizon are mapped to the milestone index that
/// confirmed them; traversals stop at these instead of walking into pruned
/// history. The set is guarded by a reader/writer lock inside the
/// [`Tangle`](crate::Tangle): readers during traversal, writers during
/// snapshot application.
#[derive(Default)]
pub struct SolidEntryPoints {
    points: HashMap<Hash, MilestoneIndex>,
}

impl SolidEntryPoints {
    /// Creates a set containing only the null hash, the genesis entry point.
    pub fn new() -> Self {
        let mut points = HashMap::new();
        points.insert(Hash::NULL, MilestoneIndex(0));

        Self { points }
    }

    /// Whether the given hash is a solid entry point.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.points.contains_key(hash)
    }

    /// The milestone index of the given solid entry point.
    pub fn index(&self, hash: &Hash) -> Option<MilestoneIndex> {
        self.points.get(hash).copied()
    }

    /// Adds a solid entry point.
    pub fn add(&mut self, hash: Hash, index: MilestoneIndex) {
        self.points.insert(hash, index);
    }

    /// Removes all solid entry points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Number of solid entry points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates over all solid entry points.
    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &MilestoneIndex)> {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_an_entry_point() {
        let points = SolidEntryPoints::new();

        assert!(points.contains(&Hash::NULL));
        assert_eq!(points.index(&Hash::NULL), Some(MilestoneIndex(0)));
    }

    #[test]
    fn add_and_clear() {
        let mut points = SolidEntryPoints::new();
        let hash = Hash::new([7u8; vespa_bundle::HASH_LENGTH]);

        points.add(hash, MilestoneIndex(3));
        assert_eq!(points.index(&hash), Some(MilestoneIndex(3)));

        points.clear();
        assert!(points.is_empty());
    }
}
