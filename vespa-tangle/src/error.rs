// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::Hash;

use thiserror::Error;

/// Errors occurring while operating on the tangle.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A referenced transaction is not stored.
    #[error("Transaction {0} not found.")]
    TransactionNotFound(Hash),
    /// The operation was aborted through its abort channel.
    #[error("Operation was aborted.")]
    OperationAborted,
    /// The snapshot file is malformed.
    #[error("Invalid snapshot file: {0}")]
    InvalidSnapshot(String),
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(#[from] vespa_storage::backend::Error),
}
