//! # OptiKV
//!
//! A versioned key-value store with optimistic concurrency control:
//! - Full per-key version history (read any past version)
//! - Writers present the version they last saw; mismatches are conflicts
//! - Per-key exclusion regions, so unrelated keys never contend
//! - Atomic commit batches handed to a pluggable durability sink
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Database                                │
//! │        put / write / get / get_version / delete / commit     │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌──────────────────┐              ┌───────────────────┐
//!   │ Concurrency      │              │ Commit            │
//!   │ Controller       │              │ Coordinator       │
//!   │ (per-key mutex)  │              │ (watermark)       │
//!   └────────┬─────────┘              └────┬─────────┬────┘
//!            │                             │         │
//!            ▼                             │         ▼
//!   ┌──────────────────┐     snapshot      │  ┌─────────────┐
//!   │ KeyedVersion     │ ◄─────────────────┘  │ Durability  │
//!   │ Store (history)  │                      │ Sink        │
//!   └──────────────────┘                      └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod store;
pub mod mvcc;
pub mod commit;
pub mod engine;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, LockStrategy, LogSyncStrategy};
pub use record::{Version, VersionedRecord};
pub use store::KeyedVersionStore;
pub use mvcc::ConcurrencyController;
pub use commit::{CommitBatch, CommitCoordinator, CommitReport, DurabilitySink, MemorySink};
pub use engine::Database;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of OptiKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
