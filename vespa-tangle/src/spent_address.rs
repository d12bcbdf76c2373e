// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::Address;
use vespa_storage::{StorableObject, StorableObjectFlags};

/// A spent address. Content-addressed: the key carries all information and
/// the realm is persisted keys-only.
pub struct SpentAddress {
    object_flags: StorableObjectFlags,
    address: Address,
}

impl SpentAddress {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            object_flags: StorableObjectFlags::default(),
            address,
        }
    }

    /// The spent address.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl StorableObject for SpentAddress {
    fn from_key_and_bytes(key: &[u8], _bytes: &[u8]) -> Result<Self, std::io::Error> {
        let address = Address::from_slice(key)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid spent address key"))?;

        Ok(Self::new(address))
    }

    fn object_key(&self) -> Vec<u8> {
        self.address.as_bytes().to_vec()
    }

    fn object_bytes(&self) -> Vec<u8> {
        Vec::new()
    }

    fn is_modified(&self) -> bool {
        self.object_flags.is_modified()
    }

    fn set_modified(&self, modified: bool) {
        self.object_flags.set_modified(modified);
    }
}
