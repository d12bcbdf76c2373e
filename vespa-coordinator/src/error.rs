// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors occurring while coordinating.
///
/// Only [`is_critical`](Error::is_critical) errors are irrecoverable; the
/// coordinator loop logs everything else and continues.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Not enough tracked tails for a tip selection.
    #[error("No tips available.")]
    NoTipsAvailable,
    /// The node has not caught up with the latest milestone yet.
    #[error("Node is not synced.")]
    NodeNotSynced,
    /// The database holds data it cannot have received from a snapshot.
    #[error("Database is tainted. Delete the coordinator database and start again from a snapshot.")]
    DatabaseTainted,
    /// Emitting a bundle through gossip failed.
    #[error("Sending the bundle failed: {0}")]
    SendFailed(String),
    /// Building a transaction failed.
    #[error("Building a transaction failed: {0}")]
    Transaction(#[from] vespa_bundle::TransactionError),
    /// The signing primitive failed.
    #[error("Signing the milestone failed: {0}")]
    Signer(String),
    /// Reading or writing the coordinator state file failed.
    #[error("Reading or writing the coordinator state failed: {0}")]
    State(#[source] std::io::Error),
    /// There is no state file and bootstrapping was not requested.
    #[error("No coordinator state file found and bootstrap was not requested.")]
    StateNotFound,
}

impl Error {
    /// Whether the error requires operator intervention instead of retrying.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::DatabaseTainted | Error::Signer(_) | Error::State(_) | Error::StateNotFound
        )
    }
}
