//! Shared runtime state for whs-daemon.
//!
//! One [`ReconcileEngine`] serves both call sites (the periodic scheduler
//! and the operator's HTTP trigger); the sweep gate here is what keeps the
//! two from overlapping. Handlers receive `State<Arc<AppState<..>>>` from
//! Axum.

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::api_types::{StatusSnapshot, SweepOutcome, SyncOutcome};
use whs_reconcile::{LedgerGateway, ReconcileEngine, StateStore, SweepReport, SyncReport};

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Result of asking for a sweep while honoring the overlap gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepRun {
    Completed(SweepReport),
    /// Another pass was already in flight; nothing was run.
    SkippedOverlap,
}

/// Result of asking for a warehouse sync while honoring the overlap gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncRun {
    Completed(SyncReport),
    /// Another pass was already in flight; nothing was run.
    SkippedOverlap,
}

/// Shared across all Axum handlers and the scheduler task (via `Arc`).
pub struct AppState<L, S> {
    engine: ReconcileEngine<L, S>,
    pub build: BuildInfo,
    pub status: RwLock<StatusSnapshot>,
    /// Held for the duration of any pass (sweep or sync). Both passes read
    /// and write the same rows and the ledger program is a single writer,
    /// so they must never interleave. `try_lock` gives skip-on-overlap.
    pass_gate: Mutex<()>,
}

impl<L, S> AppState<L, S>
where
    L: LedgerGateway,
    S: StateStore,
{
    pub fn new(engine: ReconcileEngine<L, S>) -> Self {
        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            scheduler_state: "idle".to_string(),
            sweeps_run: 0,
            sweeps_skipped_overlap: 0,
            syncs_skipped_overlap: 0,
            last_sync: None,
            last_sweep: None,
        };

        Self {
            engine,
            build: BuildInfo {
                service: "whs-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: RwLock::new(initial_status),
            pass_gate: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &ReconcileEngine<L, S> {
        &self.engine
    }

    /// Run one lease expiry sweep unless one is already in flight.
    ///
    /// Both the scheduler tick and POST /v1/reconcile/sweep come through
    /// here, so a slow sweep can never stack behind itself.
    pub async fn run_sweep_guarded(&self) -> Result<SweepRun> {
        let Ok(_gate) = self.pass_gate.try_lock() else {
            let mut st = self.status.write().await;
            st.sweeps_skipped_overlap += 1;
            warn!("another pass in flight; skipping this sweep trigger");
            return Ok(SweepRun::SkippedOverlap);
        };

        {
            let mut st = self.status.write().await;
            st.scheduler_state = "running".to_string();
        }

        let res = self.engine.run_expiry_sweep(Utc::now()).await;

        let mut st = self.status.write().await;
        st.scheduler_state = "idle".to_string();
        match res {
            Ok(report) => {
                st.sweeps_run += 1;
                st.last_sweep = Some(SweepOutcome {
                    at_utc: Utc::now(),
                    report,
                });
                Ok(SweepRun::Completed(report))
            }
            // Pass-establishment failure: leave last_sweep untouched so
            // status still shows the last completed pass.
            Err(e) => Err(e),
        }
    }

    /// Run one warehouse sync pass unless another pass is in flight.
    ///
    /// Shares the gate with the sweep: two concurrent sync triggers would
    /// read the same unregistered candidate set and register every row on
    /// the ledger twice, stranding duplicate on-chain entries.
    pub async fn run_sync_guarded(&self) -> Result<SyncRun> {
        let Ok(_gate) = self.pass_gate.try_lock() else {
            let mut st = self.status.write().await;
            st.syncs_skipped_overlap += 1;
            warn!("another pass in flight; skipping this sync trigger");
            return Ok(SyncRun::SkippedOverlap);
        };

        {
            let mut st = self.status.write().await;
            st.scheduler_state = "running".to_string();
        }

        let res = self.engine.run_warehouse_sync().await;

        let mut st = self.status.write().await;
        st.scheduler_state = "idle".to_string();
        match res {
            Ok(report) => {
                st.last_sync = Some(SyncOutcome {
                    at_utc: Utc::now(),
                    report,
                });
                Ok(SyncRun::Completed(report))
            }
            Err(e) => Err(e),
        }
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
