//! MVCC Module
//!
//! Optimistic concurrency control over the version store.
//!
//! ## Per-key state machine
//! ```text
//!                 write(expected = 0)
//!   ┌────────────┐ ─────────────────► ┌──────────────────┐
//!   │ No-History │                    │ Has-History(v=n) │ ──┐ write(expected = n)
//!   └────────────┘ ◄───────────────── └──────────────────┘ ◄─┘   → v = n + 1
//!                       delete
//! ```
//! A write whose expected version does not match stays in place and
//! raises `VersionConflict`.

mod controller;
mod locks;

pub use controller::ConcurrencyController;
pub use locks::LockRegistry;
