//! Concurrency Controller
//!
//! Optimistic version validation around single-key writes.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::config::LockStrategy;
use crate::error::{KvError, Result};
use crate::record::{Version, VersionedRecord};
use crate::store::KeyedVersionStore;

use super::LockRegistry;

/// Serializes the read-validate-append sequence per key
///
/// ## Concurrency Model
///
/// - **Writes** (write/delete): the key's exclusion region is held for the
///   whole check-and-append, so two writers presenting the same expected
///   version can never both succeed.
/// - **Reads**: go straight to the store and never touch exclusion regions.
///   A reader may see a version that is about to be superseded, but always a
///   whole record.
/// - At most one region is held at a time, so there is no cross-key deadlock.
pub struct ConcurrencyController<K, V> {
    store: Arc<KeyedVersionStore<K, V>>,
    locks: LockRegistry<K>,
}

impl<K, V> ConcurrencyController<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(store: Arc<KeyedVersionStore<K, V>>, strategy: LockStrategy) -> Self {
        Self {
            store,
            locks: LockRegistry::new(strategy),
        }
    }

    /// Install `value` as the next version if `expected_version` matches
    ///
    /// `expected_version` is the version the caller last observed, 0 for a
    /// key with no history.
    ///
    /// Returns the new record, or `VersionConflict` with no mutation.
    pub fn write(&self, key: K, value: V, expected_version: Version) -> Result<VersionedRecord<V>> {
        let region = self.locks.region(&key);
        let _region_guard = region.lock();

        let actual = self
            .store
            .get(&key)
            .map(|record| record.version())
            .unwrap_or(0);

        if actual != expected_version {
            tracing::warn!(
                "Version conflict for key {:?}: expected version {}, found {}",
                key,
                expected_version,
                actual
            );
            return Err(KvError::conflict(&key, expected_version, actual));
        }

        let record = self.store.append(key.clone(), value);
        tracing::info!("Stored key {:?} at version {}", key, record.version());
        Ok(record)
    }

    /// Erase the key's history under its exclusion region
    ///
    /// Idempotent; returns whether a history existed.
    pub fn delete(&self, key: &K) -> bool {
        let region = self.locks.region(key);
        let _region_guard = region.lock();

        let existed = self.store.remove(key);
        if existed {
            tracing::info!("Deleted key {:?}", key);
        } else {
            tracing::debug!("Delete of absent key {:?}", key);
        }
        existed
    }

    /// Latest record, read without taking the exclusion region
    pub fn read(&self, key: &K) -> Option<VersionedRecord<V>> {
        let record = self.store.get(key);
        match &record {
            Some(record) => {
                tracing::debug!("Read key {:?} at version {}", key, record.version())
            }
            None => tracing::debug!("No data for key {:?}", key),
        }
        record
    }

    pub fn store(&self) -> &Arc<KeyedVersionStore<K, V>> {
        &self.store
    }

    /// Number of exclusion regions allocated so far
    pub fn region_count(&self) -> usize {
        self.locks.region_count()
    }
}
