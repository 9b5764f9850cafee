//! Store snapshots
//!
//! Owned, point-in-time copies of every key's latest record.

use std::collections::HashMap;
use std::hash::Hash;

use crate::record::VersionedRecord;

/// Latest record of one key at snapshot time
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry<V> {
    /// Incarnation of the key's history the record belongs to
    pub incarnation: u64,
    pub record: VersionedRecord<V>,
}

/// A consistent cut across all keys.
///
/// Holds copies, so later writes to the store never show through.
#[derive(Debug, Clone)]
pub struct Snapshot<K, V> {
    generation: u64,
    entries: HashMap<K, SnapshotEntry<V>>,
}

impl<K: Eq + Hash, V> Snapshot<K, V> {
    pub(crate) fn new(generation: u64, entries: HashMap<K, SnapshotEntry<V>>) -> Self {
        Self {
            generation,
            entries,
        }
    }

    /// Number of mutations the store had applied when the cut was taken
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, key: &K) -> Option<&VersionedRecord<V>> {
        self.entries.get(key).map(|entry| &entry.record)
    }

    pub fn entry(&self, key: &K) -> Option<&SnapshotEntry<V>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &SnapshotEntry<V>)> {
        self.entries.iter()
    }

    /// Drop incarnations and keep the key → record mapping
    pub fn into_records(self) -> HashMap<K, VersionedRecord<V>> {
        self.entries
            .into_iter()
            .map(|(key, entry)| (key, entry.record))
            .collect()
    }
}
