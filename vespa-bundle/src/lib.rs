// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Transaction, hash and milestone primitives shared by every part of the node.

mod hash;
mod milestone;
mod transaction;

pub use hash::{Hash, HASH_LENGTH, TRYTE_ALPHABET};
pub use milestone::MilestoneIndex;
pub use transaction::{Transaction, TransactionError, TRANSACTION_PACKED_LENGTH};

/// Addresses are hashes; the distinction is only semantic.
pub type Address = Hash;
