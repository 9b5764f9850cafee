//! Keyed Version Store
//!
//! Authoritative owner of every key's version history.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{KvError, Result};
use crate::record::{Version, VersionedRecord};

use super::{KeyHistory, Snapshot, SnapshotEntry};

/// Holds the version history of every key
///
/// ## Concurrency:
/// - `histories`: outer RwLock guards the key set. Shared for reads and for
///   appends to existing keys, exclusive only to insert or remove a key.
/// - Each `KeyHistory` has its own RwLock, so appends to different keys run
///   in parallel.
/// - `gate`: every mutation holds the shared side; `snapshot` takes the
///   exclusive side while copying, so a snapshot never observes half of a
///   sequence of writes.
/// - Lock order is always gate → histories → history.
/// - All methods use `&self`
pub struct KeyedVersionStore<K, V> {
    histories: RwLock<HashMap<K, RwLock<KeyHistory<V>>>>,

    gate: RwLock<()>,

    /// Count of applied mutations (appends + removals of existing keys)
    generation: AtomicU64,

    /// Source of fresh incarnation ids for new histories
    next_incarnation: AtomicU64,
}

impl<K, V> KeyedVersionStore<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            gate: RwLock::new(()),
            generation: AtomicU64::new(0),
            next_incarnation: AtomicU64::new(1),
        }
    }

    /// Latest record for `key`, or `None` if the key has no history
    pub fn get(&self, key: &K) -> Option<VersionedRecord<V>> {
        let histories = self.histories.read();
        let history = histories.get(key)?.read();
        history.latest().cloned()
    }

    /// The record stored at exactly `version`
    ///
    /// Returns:
    /// - `Ok(Some(record))`: that version exists
    /// - `Ok(None)`: unknown key, version 0, or a version never written
    /// - `Err(InvalidVersion)`: `version` is negative
    pub fn get_at(&self, key: &K, version: i64) -> Result<Option<VersionedRecord<V>>> {
        if version < 0 {
            return Err(KvError::invalid_version(key, version));
        }

        let histories = self.histories.read();
        let record = histories
            .get(key)
            .and_then(|history| history.read().at(version as Version).cloned());
        Ok(record)
    }

    /// Current version of `key`, 0 if absent
    pub fn latest_version(&self, key: &K) -> Version {
        let histories = self.histories.read();
        histories
            .get(key)
            .map(|history| history.read().current_version())
            .unwrap_or(0)
    }

    /// Append `value` as the next version of `key`
    ///
    /// Starts at version 1 for a new key. Earlier versions are kept.
    pub fn append(&self, key: K, value: V) -> VersionedRecord<V> {
        let _gate = self.gate.read();

        // Fast path: key exists, only the shared outer lock is needed
        {
            let histories = self.histories.read();
            if let Some(history) = histories.get(&key) {
                let record = history.write().append(value);
                self.generation.fetch_add(1, Ordering::SeqCst);
                return record;
            }
        }

        // Slow path: create the history. Another thread may have won the
        // race in between, in which case `or_insert_with` reuses its history.
        let mut histories = self.histories.write();
        let history = histories.entry(key).or_insert_with(|| {
            let incarnation = self.next_incarnation.fetch_add(1, Ordering::SeqCst);
            RwLock::new(KeyHistory::new(incarnation))
        });
        let record = history.get_mut().append(value);
        self.generation.fetch_add(1, Ordering::SeqCst);
        record
    }

    /// Erase the whole history of `key`
    ///
    /// Idempotent. Returns whether a history existed.
    pub fn remove(&self, key: &K) -> bool {
        let _gate = self.gate.read();

        let removed = self.histories.write().remove(key).is_some();
        if removed {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Point-in-time copy of every key's latest record
    pub fn snapshot(&self) -> Snapshot<K, V> {
        let _gate = self.gate.write();

        let histories = self.histories.read();
        let entries = histories
            .iter()
            .filter_map(|(key, history)| {
                let history = history.read();
                let entry = history.latest().map(|record| SnapshotEntry {
                    incarnation: history.incarnation(),
                    record: record.clone(),
                });
                entry.map(|entry| (key.clone(), entry))
            })
            .collect();

        Snapshot::new(self.generation.load(Ordering::SeqCst), entries)
    }

    /// Full ordered history of `key` (oldest first); empty if absent
    pub fn history(&self, key: &K) -> Vec<VersionedRecord<V>> {
        let histories = self.histories.read();
        histories
            .get(key)
            .map(|history| history.read().records().to_vec())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.histories.read().contains_key(key)
    }

    /// Number of keys with a history
    pub fn len(&self) -> usize {
        self.histories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.read().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.histories.read().keys().cloned().collect()
    }

    /// Mutations applied so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl<K, V> Default for KeyedVersionStore<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
