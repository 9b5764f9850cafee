//! Store Module
//!
//! In-memory, per-key version history.
//!
//! ## Responsibilities
//! - Keep every version of every key, not just the latest
//! - Point lookups by key and by key + version
//! - Append new versions, erase whole histories
//! - Consistent snapshots for the commit coordinator
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ RwLock<HashMap<K, RwLock<KeyHistory<V>>>>    │
//! │                                              │
//! │  "user:1" ──► [v1] [v2] [v3]                 │
//! │  "user:2" ──► [v1]                           │
//! │  "cart:9" ──► [v1] [v2]                      │
//! └──────────────────────────────────────────────┘
//! ```

mod history;
mod keyed;
mod snapshot;

pub use history::KeyHistory;
pub use keyed::KeyedVersionStore;
pub use snapshot::{Snapshot, SnapshotEntry};
