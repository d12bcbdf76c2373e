// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, Transaction};
use vespa_common::packable::Packable;
use vespa_storage::{StorableObject, StorableObjectFlags};

/// A transaction as stored in the tangle, keyed by its hash.
///
/// The payload is immutable once stored; all mutable companion state lives in
/// [`TransactionMetadata`](crate::TransactionMetadata).
pub struct StoredTransaction {
    object_flags: StorableObjectFlags,
    hash: Hash,
    transaction: Transaction,
}

impl StoredTransaction {
    pub(crate) fn new(hash: Hash, transaction: Transaction) -> Self {
        Self {
            object_flags: StorableObjectFlags::default(),
            hash,
            transaction,
        }
    }

    /// The hash this transaction is stored under.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// The transaction payload.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }
}

impl StorableObject for StoredTransaction {
    fn from_key_and_bytes(key: &[u8], bytes: &[u8]) -> Result<Self, std::io::Error> {
        let hash = Hash::from_slice(key)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid transaction key"))?;
        let transaction = Transaction::unpack(&mut &bytes[..])?;

        Ok(Self::new(hash, transaction))
    }

    fn object_key(&self) -> Vec<u8> {
        self.hash.as_bytes().to_vec()
    }

    fn object_bytes(&self) -> Vec<u8> {
        // Safe to unwrap: packing into a vector cannot fail.
        self.transaction.pack_new().unwrap()
    }

    fn is_modified(&self) -> bool {
        self.object_flags.is_modified()
    }

    fn set_modified(&self, modified: bool) {
        self.object_flags.set_modified(modified);
    }
}
