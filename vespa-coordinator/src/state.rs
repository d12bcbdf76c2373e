// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_common::packable::{Packable, Read, Write};

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// The persisted coordinator state: the last issued milestone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct State {
    /// Index of the last issued milestone.
    pub latest_milestone_index: MilestoneIndex,
    /// Tail transaction of the last issued milestone bundle.
    pub latest_milestone_hash: Hash,
}

impl State {
    /// Reads the state from a file; `None` if the file does not exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Option<Self>, std::io::Error> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(Self::unpack(&mut BufReader::new(file))?))
    }

    /// Writes the state to a file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let mut writer = BufWriter::new(File::create(path)?);

        self.pack(&mut writer)
    }
}

impl Packable for State {
    type Error = std::io::Error;

    fn packed_len(&self) -> usize {
        self.latest_milestone_index.packed_len() + self.latest_milestone_hash.packed_len()
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.latest_milestone_index.pack(writer)?;
        self.latest_milestone_hash.pack(writer)
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        Ok(Self {
            latest_milestone_index: MilestoneIndex::unpack(reader)?,
            latest_milestone_hash: Hash::unpack(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vespa_bundle::HASH_LENGTH;

    #[test]
    fn file_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("coordinator.state");

        assert_eq!(State::from_file(&path).unwrap(), None);

        let state = State {
            latest_milestone_index: MilestoneIndex(7),
            latest_milestone_hash: Hash::new([3u8; HASH_LENGTH]),
        };

        state.to_file(&path).unwrap();

        assert_eq!(State::from_file(&path).unwrap(), Some(state));
    }
}
