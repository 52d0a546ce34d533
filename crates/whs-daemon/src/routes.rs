//! Axum router and all HTTP handlers for whs-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::{
    api_types::{ErrorResponse, HealthResponse, SweepTriggerResponse, SyncTriggerResponse},
    state::{uptime_secs, AppState, SweepRun, SyncRun},
};
use whs_reconcile::{LedgerGateway, StateStore};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router<L, S>(state: Arc<AppState<L, S>>) -> Router
where
    L: LedgerGateway + 'static,
    S: StateStore + 'static,
{
    Router::new()
        .route("/v1/health", get(health::<L, S>))
        .route("/v1/status", get(status_handler::<L, S>))
        .route("/v1/reconcile/sweep", post(reconcile_sweep::<L, S>))
        .route("/v1/reconcile/sync", post(reconcile_sync::<L, S>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health<L, S>(State(st): State<Arc<AppState<L, S>>>) -> impl IntoResponse
where
    L: LedgerGateway + 'static,
    S: StateStore + 'static,
{
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler<L, S>(State(st): State<Arc<AppState<L, S>>>) -> impl IntoResponse
where
    L: LedgerGateway + 'static,
    S: StateStore + 'static,
{
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/sweep
// ---------------------------------------------------------------------------

/// Operator-triggered lease expiry sweep.
///
/// Shares the overlap gate with the scheduler and the sync trigger: if any
/// pass is already in flight the request is refused with `409 Conflict`
/// instead of queueing a second one.
pub(crate) async fn reconcile_sweep<L, S>(State(st): State<Arc<AppState<L, S>>>) -> Response
where
    L: LedgerGateway + 'static,
    S: StateStore + 'static,
{
    match st.run_sweep_guarded().await {
        Ok(SweepRun::Completed(report)) => {
            info!(completed = report.completed, failed = report.failed, "manual sweep finished");
            (StatusCode::OK, Json(SweepTriggerResponse { report })).into_response()
        }
        Ok(SweepRun::SkippedOverlap) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "a reconcile pass is already in flight".to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: format!("sweep failed: {e:#}"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/sync
// ---------------------------------------------------------------------------

/// Operator-triggered warehouse sync pass.
///
/// Shares the overlap gate with the sweep and the scheduler: if any pass
/// is already in flight the request is refused with `409 Conflict`.
pub(crate) async fn reconcile_sync<L, S>(State(st): State<Arc<AppState<L, S>>>) -> Response
where
    L: LedgerGateway + 'static,
    S: StateStore + 'static,
{
    match st.run_sync_guarded().await {
        Ok(SyncRun::Completed(report)) => {
            info!(synced = report.synced, skipped = report.skipped, "manual sync finished");
            (StatusCode::OK, Json(SyncTriggerResponse { report })).into_response()
        }
        Ok(SyncRun::SkippedOverlap) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "a reconcile pass is already in flight".to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: format!("sync failed: {e:#}"),
            }),
        )
            .into_response(),
    }
}
