// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{Address, Hash, HASH_LENGTH};

use vespa_common::packable::{Packable, Read, Write};

use thiserror::Error;

/// Packed length of a transaction: four hashes and five 8-byte fields.
pub const TRANSACTION_PACKED_LENGTH: usize = 4 * HASH_LENGTH + 5 * 8;

/// Errors occurring when building or unpacking a transaction.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The index is greater than the last index of the bundle.
    #[error("Transaction index {0} exceeds last index {1}.")]
    InvalidIndex(u64, u64),
    /// A referenced hash is the null hash where a real reference is required.
    #[error("Transaction references the null hash.")]
    NullReference,
    /// An I/O error occurred while packing or unpacking.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A transaction in the tangle.
///
/// Transactions are immutable once created. Every transaction references two
/// predecessors, the trunk and the branch, and belongs to a bundle. The
/// transaction with index 0 is the tail of its bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    trunk: Hash,
    branch: Hash,
    bundle: Hash,
    address: Address,
    value: i64,
    index: u64,
    last_index: u64,
    tag: u64,
    attachment_timestamp: u64,
}

impl Transaction {
    /// Creates a new transaction, checking index consistency.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trunk: Hash,
        branch: Hash,
        bundle: Hash,
        address: Address,
        value: i64,
        index: u64,
        last_index: u64,
        tag: u64,
        attachment_timestamp: u64,
    ) -> Result<Self, TransactionError> {
        if index > last_index {
            return Err(TransactionError::InvalidIndex(index, last_index));
        }

        Ok(Self {
            trunk,
            branch,
            bundle,
            address,
            value,
            index,
            last_index,
            tag,
            attachment_timestamp,
        })
    }

    /// The trunk reference.
    pub fn trunk(&self) -> &Hash {
        &self.trunk
    }

    /// The branch reference.
    pub fn branch(&self) -> &Hash {
        &self.branch
    }

    /// The bundle hash shared by all transactions of the bundle.
    pub fn bundle(&self) -> &Hash {
        &self.bundle
    }

    /// The address this transaction credits or debits.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The transferred value; negative values spend from the address.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// The index of this transaction within its bundle.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The last index of the bundle this transaction belongs to.
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// The tag. Coordinator bundles encode the milestone index here.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// The attachment timestamp in seconds.
    pub fn attachment_timestamp(&self) -> u64 {
        self.attachment_timestamp
    }

    /// Whether this transaction is the tail of its bundle.
    pub fn is_tail(&self) -> bool {
        self.index == 0
    }

    /// Computes the hash of this transaction over its packed bytes.
    pub fn hash(&self) -> Hash {
        // Safe to unwrap: packing into a vector cannot fail.
        Hash::digest(&self.pack_new().unwrap())
    }
}

impl Packable for Transaction {
    type Error = std::io::Error;

    fn packed_len(&self) -> usize {
        TRANSACTION_PACKED_LENGTH
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.trunk.pack(writer)?;
        self.branch.pack(writer)?;
        self.bundle.pack(writer)?;
        self.address.pack(writer)?;
        self.value.pack(writer)?;
        self.index.pack(writer)?;
        self.last_index.pack(writer)?;
        self.tag.pack(writer)?;
        self.attachment_timestamp.pack(writer)
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        Ok(Self {
            trunk: Hash::unpack(reader)?,
            branch: Hash::unpack(reader)?,
            bundle: Hash::unpack(reader)?,
            address: Address::unpack(reader)?,
            value: i64::unpack(reader)?,
            index: u64::unpack(reader)?,
            last_index: u64::unpack(reader)?,
            tag: u64::unpack(reader)?,
            attachment_timestamp: u64::unpack(reader)?,
        })
    }
}
