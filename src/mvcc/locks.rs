//! Exclusion region registry
//!
//! Maps keys onto the mutexes that serialize their writers.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::LockStrategy;

/// Registry of per-key exclusion regions
///
/// - `PerKey`: a region is created on first use of a key and never removed.
///   Unrelated keys never contend, at the cost of one small entry per key.
/// - `Sharded`: a fixed vector of regions indexed by key hash. Memory is
///   bounded; unrelated keys may share a region.
pub enum LockRegistry<K> {
    PerKey {
        regions: RwLock<HashMap<K, Arc<Mutex<()>>>>,
    },
    Sharded {
        regions: Vec<Arc<Mutex<()>>>,
    },
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    pub fn new(strategy: LockStrategy) -> Self {
        match strategy {
            LockStrategy::PerKey => LockRegistry::PerKey {
                regions: RwLock::new(HashMap::new()),
            },
            LockStrategy::Sharded { shards } => LockRegistry::Sharded {
                regions: (0..shards.max(1))
                    .map(|_| Arc::new(Mutex::new(())))
                    .collect(),
            },
        }
    }

    /// Number of regions currently allocated
    pub fn region_count(&self) -> usize {
        match self {
            LockRegistry::PerKey { regions } => regions.read().len(),
            LockRegistry::Sharded { regions } => regions.len(),
        }
    }

    /// The region covering `key`, created on first use under `PerKey`.
    ///
    /// Callers lock it for the duration of their critical section; the
    /// `MutexGuard` releases it on every exit path.
    pub fn region(&self, key: &K) -> Arc<Mutex<()>> {
        match self {
            LockRegistry::PerKey { regions } => {
                if let Some(region) = regions.read().get(key) {
                    return Arc::clone(region);
                }
                let mut regions = regions.write();
                Arc::clone(
                    regions
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(()))),
                )
            }
            LockRegistry::Sharded { regions } => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                let index = (hasher.finish() % regions.len() as u64) as usize;
                Arc::clone(&regions[index])
            }
        }
    }
}
