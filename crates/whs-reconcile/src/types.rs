//! Pass reports. Stable, serializable shapes returned by both call sites
//! (scheduler tick and on-demand HTTP trigger).

use serde::{Deserialize, Serialize};

/// Outcome of one Warehouse Sync pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Warehouses registered on the ledger and linked locally.
    pub synced: u32,
    /// Warehouses whose registration hard-failed (revert, timeout) and
    /// were left for a later pass.
    pub skipped: u32,
}

/// Outcome of one Lease Expiry Sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Leases brought to a terminal local state (ledger completion,
    /// stale-flag copy, or orphan heal).
    pub completed: u32,
    /// Leases left untouched for the next tick (failure or deferral).
    pub failed: u32,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.completed == 0 && self.failed == 0
    }
}
