//! Warehouse sync pushes active, unregistered warehouses to the ledger
//! in ascending local-id order, sanitizing free text on the way out.
//! Inactive and already-linked rows are not candidates.

use whs_reconcile::ReconcileEngine;
use whs_schemas::{LedgerError, WarehouseRecord};
use whs_testkit::{LedgerWriteOp, MemoryLedger, MemoryStore};

fn unregistered(id: i64, name: &str) -> WarehouseRecord {
    WarehouseRecord {
        id,
        ledger_id: 0,
        owner_address: "0x00000000000000000000000000000000000000a1".to_string(),
        name: name.to_string(),
        location: "Pier 4".to_string(),
        total_area: 500,
        available_area: 500,
        price_per_unit_per_day: 5,
        is_active: true,
        image_url: String::new(),
        description: String::new(),
    }
}

#[tokio::test]
async fn scenario_candidates_pushed_in_ascending_id_order() {
    let ledger = MemoryLedger::new();
    // Counter covers the one pre-existing link so no reset is inferred.
    ledger.set_warehouse_counter(7);
    let store = MemoryStore::new();
    // Insertion order deliberately scrambled.
    store.insert_warehouse(unregistered(3, "Gamma"));
    store.insert_warehouse(unregistered(1, "Alpha"));
    store.insert_warehouse(unregistered(2, "Beta"));
    // Not candidates: already linked / inactive.
    let mut linked = unregistered(4, "Linked");
    linked.ledger_id = 7;
    store.insert_warehouse(linked);
    let mut inactive = unregistered(5, "Dormant");
    inactive.is_active = false;
    store.insert_warehouse(inactive);

    let engine = ReconcileEngine::new(ledger, store);
    let report = engine.run_warehouse_sync().await.unwrap();

    assert_eq!(report.synced, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(
        engine.ledger().writes(),
        vec![
            LedgerWriteOp::RegisterWarehouse { name: "Alpha".to_string() },
            LedgerWriteOp::RegisterWarehouse { name: "Beta".to_string() },
            LedgerWriteOp::RegisterWarehouse { name: "Gamma".to_string() },
        ]
    );

    // Links recorded with the ids the ledger allocated.
    assert_eq!(engine.store().warehouse(1).unwrap().ledger_id, 8);
    assert_eq!(engine.store().warehouse(2).unwrap().ledger_id, 9);
    assert_eq!(engine.store().warehouse(3).unwrap().ledger_id, 10);
    assert_eq!(engine.store().warehouse(4).unwrap().ledger_id, 7);
    assert_eq!(engine.store().warehouse(5).unwrap().ledger_id, 0);
}

#[tokio::test]
async fn scenario_free_text_sanitized_before_registration() {
    let ledger = MemoryLedger::new();
    let store = MemoryStore::new();

    let mut wh = unregistered(1, "Dock\u{0007} A\u{0000}");
    wh.description = "x".repeat(150);
    store.insert_warehouse(wh);

    let engine = ReconcileEngine::new(ledger, store);
    let report = engine.run_warehouse_sync().await.unwrap();
    assert_eq!(report.synced, 1);

    let registered = engine.ledger().warehouse(1).unwrap();
    assert_eq!(registered.name, "Dock A");
    assert_eq!(registered.description.chars().count(), 100);
}

#[tokio::test]
async fn scenario_one_failed_registration_skips_only_that_row() {
    let ledger = MemoryLedger::new();
    ledger.fail_next_register(LedgerError::Reverted {
        reason: "out of gas".to_string(),
    });

    let store = MemoryStore::new();
    store.insert_warehouse(unregistered(1, "Alpha"));
    store.insert_warehouse(unregistered(2, "Beta"));

    let engine = ReconcileEngine::new(ledger, store);
    let report = engine.run_warehouse_sync().await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(engine.store().warehouse(1).unwrap().ledger_id, 0);
    assert!(engine.store().warehouse(2).unwrap().ledger_id > 0);
}
