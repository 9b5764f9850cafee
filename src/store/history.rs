//! Per-key version history
//!
//! An append-only, contiguous sequence of records for one key.

use crate::record::{Version, VersionedRecord};

/// Ordered history of one key: `records[i]` holds version `i + 1`
#[derive(Debug, Clone)]
pub struct KeyHistory<V> {
    /// Identifies this life of the key. A key that is deleted and written
    /// again gets a fresh incarnation, so equal version numbers from
    /// different lives are never confused.
    incarnation: u64,

    records: Vec<VersionedRecord<V>>,
}

impl<V: Clone> KeyHistory<V> {
    pub fn new(incarnation: u64) -> Self {
        Self {
            incarnation,
            records: Vec::new(),
        }
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    /// Highest version present, 0 when empty
    pub fn current_version(&self) -> Version {
        self.records.len() as Version
    }

    pub fn latest(&self) -> Option<&VersionedRecord<V>> {
        self.records.last()
    }

    /// Exact lookup; version 0 and versions past the end are absent
    pub fn at(&self, version: Version) -> Option<&VersionedRecord<V>> {
        if version == 0 {
            return None;
        }
        let index = usize::try_from(version - 1).ok()?;
        self.records.get(index)
    }

    /// Install `value` as the next version and return the new record
    pub fn append(&mut self, value: V) -> VersionedRecord<V> {
        let record = VersionedRecord::new(self.current_version() + 1, value);
        self.records.push(record.clone());
        record
    }

    pub fn records(&self) -> &[VersionedRecord<V>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
