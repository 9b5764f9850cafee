//! Versioned records
//!
//! The unit exchanged between the concurrency controller and the store.

use serde::{Deserialize, Serialize};

/// Version tag of a record. The first write to a key produces version 1;
/// 0 means "no version yet".
pub type Version = u64;

/// An immutable value tagged with its version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedRecord<V> {
    version: Version,
    value: V,
}

impl<V> VersionedRecord<V> {
    pub fn new(version: Version, value: V) -> Self {
        Self { version, value }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    /// Split into `(version, value)`
    pub fn into_parts(self) -> (Version, V) {
        (self.version, self.value)
    }
}
