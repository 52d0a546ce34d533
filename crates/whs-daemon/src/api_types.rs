//! Request and response types for all whs-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use whs_reconcile::{SweepReport, SyncReport};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

/// Outcome of the most recent warehouse sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub at_utc: DateTime<Utc>,
    pub report: SyncReport,
}

/// Outcome of the most recent lease expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub at_utc: DateTime<Utc>,
    pub report: SweepReport,
}

/// Point-in-time snapshot of daemon state, returned by GET /v1/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "idle" | "running"
    pub scheduler_state: String,
    /// Scheduler ticks that actually ran a sweep.
    pub sweeps_run: u64,
    /// Ticks skipped because another pass was still in flight.
    pub sweeps_skipped_overlap: u64,
    /// Sync triggers refused because another pass was still in flight.
    pub syncs_skipped_overlap: u64,
    pub last_sync: Option<SyncOutcome>,
    pub last_sweep: Option<SweepOutcome>,
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/sweep  /v1/reconcile/sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepTriggerResponse {
    pub report: SweepReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTriggerResponse {
    pub report: SyncReport,
}

/// Error body for refused or failed operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
