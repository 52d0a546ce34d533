//! Reconciliation core: keeps the relational store consistent with the
//! ledger's canonical facts despite non-atomic two-system writes, partial
//! failures, and ledger resets.
//!
//! Two passes, one engine:
//! - **Warehouse Sync** pushes unregistered warehouses to the ledger
//!   (with reset detection via the ledger's global counter).
//! - **Lease Expiry Sweep** completes expired leases on the ledger and/or
//!   heals local state (orphans, stale flags).
//!
//! Drift classification is pure ([`drift`]); all I/O goes through the
//! [`ports`] traits so the engine is testable with in-memory doubles.

pub mod drift;
pub mod engine;
pub mod ports;
pub mod sanitize;
pub mod types;

pub use drift::{classify_lease, classify_warehouse, Drift, FieldDiff};
pub use engine::ReconcileEngine;
pub use ports::{LedgerGateway, StateStore};
pub use types::{SweepReport, SyncReport};
