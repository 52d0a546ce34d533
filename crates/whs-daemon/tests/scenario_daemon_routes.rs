//! In-process scenario tests for whs-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot` — no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot

use whs_daemon::{routes, state};
use whs_reconcile::ReconcileEngine;
use whs_schemas::{LeaseRecord, LedgerLease, LedgerWarehouse, WarehouseRecord};
use whs_testkit::{MemoryLedger, MemoryStore};

const NOW_TS: i64 = 1_700_000_000;

type TestState = state::AppState<MemoryLedger, MemoryStore>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// AppState over test doubles, with one expired lease and one pending
/// warehouse seeded so the trigger endpoints have work to do.
fn seeded_state() -> Arc<TestState> {
    let ledger = MemoryLedger::new();
    ledger.set_now_ts(NOW_TS);
    ledger.seed_warehouse(
        10,
        LedgerWarehouse {
            owner: "0x00000000000000000000000000000000000000a1".to_string(),
            name: "Warehouse 1".to_string(),
            location: "Pier 4".to_string(),
            total_area: 1_000,
            available_area: 600,
            price_per_unit_per_day: 5,
            image_url: String::new(),
            description: String::new(),
            is_active: true,
        },
    );
    ledger.seed_lease(
        5,
        LedgerLease {
            tenant: "0x00000000000000000000000000000000000000c1".to_string(),
            warehouse_id: 10,
            area: 400,
            start_ts: NOW_TS - 30 * 86_400,
            end_ts: NOW_TS - 3_600,
            total_price: 100,
            is_active: true,
            is_completed: false,
        },
    );

    let store = MemoryStore::new();
    store.insert_warehouse(WarehouseRecord {
        id: 1,
        ledger_id: 10,
        owner_address: "0x00000000000000000000000000000000000000a1".to_string(),
        name: "Warehouse 1".to_string(),
        location: "Pier 4".to_string(),
        total_area: 1_000,
        available_area: 600,
        price_per_unit_per_day: 5,
        is_active: true,
        image_url: String::new(),
        description: String::new(),
    });
    store.insert_warehouse(WarehouseRecord {
        id: 2,
        ledger_id: 0,
        owner_address: "0x00000000000000000000000000000000000000a1".to_string(),
        name: "Warehouse 2".to_string(),
        location: "Pier 9".to_string(),
        total_area: 800,
        available_area: 800,
        price_per_unit_per_day: 3,
        is_active: true,
        image_url: String::new(),
        description: String::new(),
    });
    store.insert_lease(LeaseRecord {
        id: 1,
        ledger_id: 5,
        warehouse_id: 1,
        tenant_address: "0x00000000000000000000000000000000000000c1".to_string(),
        area: 400,
        start_date: Utc.timestamp_opt(NOW_TS - 30 * 86_400, 0).unwrap(),
        end_date: Utc.timestamp_opt(NOW_TS - 3_600, 0).unwrap(),
        total_price: 100,
        is_active: true,
        is_completed: false,
        tx_reference: None,
    });

    Arc::new(state::AppState::new(ReconcileEngine::new(ledger, store)))
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let router = routes::build_router(seeded_state());
    let (status, body) = call(router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "whs-daemon");
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_starts_idle_with_no_pass_history() {
    let router = routes::build_router(seeded_state());
    let (status, body) = call(router, get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["scheduler_state"], "idle");
    assert_eq!(json["sweeps_run"], 0);
    assert!(json["last_sweep"].is_null());
    assert!(json["last_sync"].is_null());
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_sweep_settles_expired_lease_and_updates_status() {
    let st = seeded_state();

    let (status, body) = call(routes::build_router(Arc::clone(&st)), post("/v1/reconcile/sweep")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["report"]["completed"], 1);
    assert_eq!(json["report"]["failed"], 0);

    let lease = st.engine().store().lease(1).unwrap();
    assert!(lease.is_completed);

    let (_, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    let json = parse_json(body);
    assert_eq!(json["sweeps_run"], 1);
    assert_eq!(json["last_sweep"]["report"]["completed"], 1);
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_sync_links_pending_warehouse() {
    let st = seeded_state();

    let (status, body) = call(routes::build_router(Arc::clone(&st)), post("/v1/reconcile/sync")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["report"]["synced"], 1);
    assert_eq!(json["report"]["skipped"], 0);
    assert!(st.engine().store().warehouse(2).unwrap().ledger_id > 0);

    let (_, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    assert_eq!(parse_json(body)["last_sync"]["report"]["synced"], 1);
}

// ---------------------------------------------------------------------------
// Unknown routes return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let router = routes::build_router(seeded_state());
    let (status, _) = call(router, get("/v1/does_not_exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
