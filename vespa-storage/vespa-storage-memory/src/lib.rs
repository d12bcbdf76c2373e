// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! An in-memory [`StorageBackend`] used by tests and as the default engine
//! stand-in.

use vespa_storage::{backend, StorageBackend};

use std::{collections::BTreeMap, sync::RwLock};

/// A storage backend keeping everything in a sorted in-memory map.
#[derive(Default)]
pub struct MemoryBackend {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    /// Whether the backend holds no entry at all.
    pub fn is_empty(&self) -> bool {
        self.map.read().unwrap().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>, backend::Error> {
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<(), backend::Error> {
        self.map.write().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), backend::Error> {
        self.map.write().unwrap().remove(key);
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, backend::Error> {
        Ok(self.map.read().unwrap().contains_key(key))
    }

    fn iter_prefix(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<(), backend::Error> {
        // The visitor must not reenter the backend, so iteration happens on a
        // snapshot of the matching range.
        let entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .map
            .read()
            .unwrap()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        for (key, value) in entries {
            if !visitor(&key, &value) {
                break;
            }
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), backend::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_fetch_delete() {
        let backend = MemoryBackend::new();

        backend.insert(b"key", b"value").unwrap();
        assert_eq!(backend.fetch(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(backend.contains(b"key").unwrap());

        backend.delete(b"key").unwrap();
        assert_eq!(backend.fetch(b"key").unwrap(), None);
    }

    #[test]
    fn prefix_iteration_stays_in_prefix() {
        let backend = MemoryBackend::new();

        backend.insert(&[0, 1], b"a").unwrap();
        backend.insert(&[0, 2], b"b").unwrap();
        backend.insert(&[1, 1], b"c").unwrap();

        let mut seen = Vec::new();
        backend
            .iter_prefix(&[0], &mut |key, _| {
                seen.push(key.to_vec());
                true
            })
            .unwrap();

        assert_eq!(seen, vec![vec![0, 1], vec![0, 2]]);
    }

    #[test]
    fn prefix_iteration_stops_on_false() {
        let backend = MemoryBackend::new();

        backend.insert(&[0, 1], b"a").unwrap();
        backend.insert(&[0, 2], b"b").unwrap();

        let mut seen = 0;
        backend
            .iter_prefix(&[0], &mut |_, _| {
                seen += 1;
                false
            })
            .unwrap();

        assert_eq!(seen, 1);
    }
}
