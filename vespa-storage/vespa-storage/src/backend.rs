// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The contract every persistent key-value engine has to fulfill.

use thiserror::Error;

/// Errors occurring when accessing a storage backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The backend failed to perform an operation.
    #[error("Backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A persistent, byte-keyed, byte-valued map with prefix iteration.
///
/// The embedded engine itself is an external collaborator; the node only
/// relies on this trait.
pub trait StorageBackend: Send + Sync + 'static {
    /// Fetches the value associated with the key.
    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Inserts or replaces the value associated with the key.
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Deletes the value associated with the key, if any.
    fn delete(&self, key: &[u8]) -> Result<(), Error>;

    /// Whether a value is associated with the key.
    fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        Ok(self.fetch(key)?.is_some())
    }

    /// Calls the visitor for every entry whose key starts with the prefix,
    /// until the visitor returns `false` or the entries are exhausted.
    fn iter_prefix(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<(), Error>;

    /// Drains all buffered writes to the persistent medium.
    fn flush(&self) -> Result<(), Error>;
}
