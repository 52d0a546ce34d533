//! Near a lease's end the local and ledger clocks can disagree. The
//! sweep never forces the issue: it defers and lets a later tick settle
//! the record once the ledger agrees it ended.

use chrono::{DateTime, TimeZone, Utc};
use whs_reconcile::ReconcileEngine;
use whs_schemas::{LeaseRecord, LedgerError, LedgerLease, LedgerWarehouse, WarehouseRecord};
use whs_testkit::{MemoryLedger, MemoryStore};

const NOW_TS: i64 = 1_700_000_000;

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(NOW_TS, 0).unwrap()
}

fn seeded(end_ts: i64) -> ReconcileEngine<MemoryLedger, MemoryStore> {
    let ledger = MemoryLedger::new();
    ledger.set_now_ts(NOW_TS);
    ledger.seed_warehouse(
        10,
        LedgerWarehouse {
            owner: "0x00000000000000000000000000000000000000a1".to_string(),
            name: "Warehouse".to_string(),
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
            end_ts,
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
        name: "Warehouse".to_string(),
        location: "Pier 4".to_string(),
        total_area: 1_000,
        available_area: 600,
        price_per_unit_per_day: 5,
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
        // Locally expired a minute ago.
        end_date: Utc.timestamp_opt(NOW_TS - 60, 0).unwrap(),
        total_price: 100,
        is_active: true,
        is_completed: false,
        tx_reference: None,
    });

    ReconcileEngine::new(ledger, store)
}

#[tokio::test]
async fn scenario_ledger_end_in_future_defers_without_any_write() {
    // Ledger clock says 30 more seconds to go.
    let engine = seeded(NOW_TS + 30);

    let report = engine.run_expiry_sweep(now()).await.unwrap();
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(engine.ledger().write_count(), 0);

    let lease = engine.store().lease(1).unwrap();
    assert!(lease.is_active);
    assert!(!lease.is_completed);
    assert_eq!(engine.store().warehouse(1).unwrap().available_area, 600);
}

#[tokio::test]
async fn scenario_not_yet_ended_revert_defers_then_next_tick_settles() {
    // Ledger view says ended, but the program's own check disagrees.
    let engine = seeded(NOW_TS - 1);
    engine.ledger().fail_complete_lease(
        5,
        LedgerError::Reverted {
            reason: "Lease has not ended yet".to_string(),
        },
    );

    let report = engine.run_expiry_sweep(now()).await.unwrap();
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed, 1);

    let lease = engine.store().lease(1).unwrap();
    assert!(lease.is_active, "a deferral must not mutate local state");
    assert!(!lease.is_completed);

    // Clock caught up: the next tick settles it.
    engine.ledger().clear_complete_lease_failure(5);
    let second = engine.run_expiry_sweep(now()).await.unwrap();
    assert_eq!(second.completed, 1);
    assert!(engine.store().lease(1).unwrap().is_completed);
    assert!(engine.store().area_conserved(1));
}

#[tokio::test]
async fn scenario_confirmation_timeout_leaves_local_state_untouched() {
    let engine = seeded(NOW_TS - 1);
    engine
        .ledger()
        .fail_complete_lease(5, LedgerError::ConfirmationTimeout);

    let report = engine.run_expiry_sweep(now()).await.unwrap();
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed, 1);

    // Confirmation unknown: neither flags nor area may move.
    let lease = engine.store().lease(1).unwrap();
    assert!(lease.is_active);
    assert!(!lease.is_completed);
    assert_eq!(engine.store().warehouse(1).unwrap().available_area, 600);

    engine.ledger().clear_complete_lease_failure(5);
    let second = engine.run_expiry_sweep(now()).await.unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(engine.store().warehouse(1).unwrap().available_area, 1_000);
    assert!(engine.store().area_conserved(1));
}
