// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! A byte-keyed storage backend abstraction and a TTL cache with explicit
//! reference-counted handles layered on top of it.

pub mod backend;

mod cached;
mod object_storage;
mod options;

pub use backend::StorageBackend;
pub use cached::CachedObject;
pub use object_storage::{ObjectStorage, StorableObject, StorableObjectFlags};
pub use options::{LeakDetectionOptions, ObjectStorageOptions};
