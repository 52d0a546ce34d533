//! Engine ports. The concrete gateway (`whs-ledger`) and store (`whs-db`)
//! implement these; `whs-testkit` provides deterministic doubles.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use whs_schemas::{
    Confirmation, LeaseRecord, LedgerError, LedgerLease, LedgerWarehouse, Registered,
    WarehouseRecord, WarehouseRegistration, WarehouseUpdate,
};

/// Read/write interface of the deployed ledger program.
///
/// # Contract
/// - Reads map the ledger's zero-address sentinel to `None`; callers never
///   see a "record" that was never written.
/// - Writes block until confirmed-or-reverted (bounded by the gateway's
///   configured timeout) and serialize internally: one in-process writer
///   per credential, so concurrent calls cannot race the nonce.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Cheap liveness probe (current block height).
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Global count of warehouses ever registered on the ledger.
    async fn warehouse_counter(&self) -> Result<i64, LedgerError>;

    /// Global count of leases ever created on the ledger.
    async fn lease_counter(&self) -> Result<i64, LedgerError>;

    async fn get_warehouse(&self, ledger_id: i64) -> Result<Option<LedgerWarehouse>, LedgerError>;

    async fn get_lease(&self, ledger_id: i64) -> Result<Option<LedgerLease>, LedgerError>;

    async fn register_warehouse(
        &self,
        reg: &WarehouseRegistration,
    ) -> Result<Registered, LedgerError>;

    async fn update_warehouse(
        &self,
        ledger_id: i64,
        update: &WarehouseUpdate,
    ) -> Result<Confirmation, LedgerError>;

    /// `payment` is the amount sent with the call, in the smallest
    /// currency unit.
    async fn create_lease(
        &self,
        warehouse_ledger_id: i64,
        area: i64,
        duration_days: i64,
        payment: i64,
    ) -> Result<Registered, LedgerError>;

    async fn complete_lease(&self, ledger_id: i64) -> Result<Confirmation, LedgerError>;
}

/// Typed access to the relational store's warehouse and lease rows.
/// No business logic behind these; the engine owns all decisions.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Active warehouses with `ledger_id = 0`, ordered by local id
    /// ascending (insertion order = first-registered-first-synced).
    async fn unregistered_warehouses(&self) -> Result<Vec<WarehouseRecord>>;

    /// Count of active warehouses that believe they are ledger-linked
    /// (`ledger_id > 0`).
    async fn linked_active_warehouse_count(&self) -> Result<i64>;

    /// Bulk re-link after a detected ledger reset: set every active
    /// warehouse's `ledger_id` back to 0. Returns rows affected.
    async fn reset_ledger_links(&self) -> Result<u64>;

    async fn set_warehouse_ledger_id(&self, id: i64, ledger_id: i64) -> Result<()>;

    async fn get_warehouse(&self, id: i64) -> Result<Option<WarehouseRecord>>;

    /// Active, uncompleted leases with `end_date < now`, ordered by
    /// `end_date` ascending (earliest-expired freed first).
    async fn expired_active_leases(&self, now: DateTime<Utc>) -> Result<Vec<LeaseRecord>>;

    async fn set_lease_flags(&self, id: i64, is_active: bool, is_completed: bool) -> Result<()>;

    /// Add `area` back to the warehouse's `available_area` (local id key).
    async fn restore_warehouse_area(&self, warehouse_id: i64, area: i64) -> Result<()>;

    /// Overwrite `available_area` with the ledger's value (ledger id key).
    async fn set_available_area_by_ledger_id(
        &self,
        ledger_id: i64,
        available_area: i64,
    ) -> Result<()>;
}
