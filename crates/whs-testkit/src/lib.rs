//! Deterministic test doubles for the reconciliation engine.
//!
//! No randomness, no network I/O, no database: [`MemoryLedger`] models the
//! ledger program's observable behavior (counters, revert rules, area
//! release on completion) and records every write so tests can assert
//! ordering and zero-write properties. [`MemoryStore`] is a plain
//! in-memory row store.

pub mod memory_ledger;
pub mod memory_store;

pub use memory_ledger::{LedgerWriteOp, MemoryLedger};
pub use memory_store::MemoryStore;
