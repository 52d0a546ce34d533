//! Scriptable in-memory ledger double.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use whs_reconcile::LedgerGateway;
use whs_schemas::{
    Confirmation, LedgerError, LedgerLease, LedgerWarehouse, Registered, WarehouseRegistration,
    WarehouseUpdate,
};

/// One recorded ledger write, in submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerWriteOp {
    RegisterWarehouse { name: String },
    UpdateWarehouse { ledger_id: i64 },
    CreateLease { warehouse_ledger_id: i64 },
    CompleteLease { ledger_id: i64 },
}

#[derive(Default)]
struct Inner {
    warehouses: BTreeMap<i64, LedgerWarehouse>,
    leases: BTreeMap<i64, LedgerLease>,
    warehouse_counter: i64,
    lease_counter: i64,
    /// The double's notion of chain time (unix seconds).
    now_ts: i64,
    next_tx: u64,
    writes: Vec<LedgerWriteOp>,
    fail_get_lease: BTreeMap<i64, LedgerError>,
    fail_complete_lease: BTreeMap<i64, LedgerError>,
    fail_register: Option<LedgerError>,
    fail_warehouse_counter: Option<LedgerError>,
    caller: String,
}

/// Deterministic ledger double. Counters, revert reasons and area release
/// mirror the deployed program's observable behavior.
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        let inner = Inner {
            caller: "0x00000000000000000000000000000000000000c1".to_string(),
            ..Inner::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Test double: a poisoned lock means a test already panicked.
        self.inner.lock().expect("MemoryLedger lock poisoned")
    }

    // -- seeding ------------------------------------------------------------

    pub fn set_now_ts(&self, ts: i64) {
        self.lock().now_ts = ts;
    }

    /// Seed a warehouse slot; the counter is raised to cover the id.
    pub fn seed_warehouse(&self, ledger_id: i64, wh: LedgerWarehouse) {
        let mut inner = self.lock();
        inner.warehouse_counter = inner.warehouse_counter.max(ledger_id);
        inner.warehouses.insert(ledger_id, wh);
    }

    /// Seed a lease slot; the counter is raised to cover the id.
    pub fn seed_lease(&self, ledger_id: i64, lease: LedgerLease) {
        let mut inner = self.lock();
        inner.lease_counter = inner.lease_counter.max(ledger_id);
        inner.leases.insert(ledger_id, lease);
    }

    /// Force the global warehouse counter (reset simulation).
    pub fn set_warehouse_counter(&self, counter: i64) {
        self.lock().warehouse_counter = counter;
    }

    // -- failure injection --------------------------------------------------

    pub fn fail_get_lease(&self, ledger_id: i64, err: LedgerError) {
        self.lock().fail_get_lease.insert(ledger_id, err);
    }

    pub fn fail_complete_lease(&self, ledger_id: i64, err: LedgerError) {
        self.lock().fail_complete_lease.insert(ledger_id, err);
    }

    pub fn clear_complete_lease_failure(&self, ledger_id: i64) {
        self.lock().fail_complete_lease.remove(&ledger_id);
    }

    pub fn fail_next_register(&self, err: LedgerError) {
        self.lock().fail_register = Some(err);
    }

    /// Fail every counter read until cleared (pass-establishment failure).
    pub fn fail_warehouse_counter(&self, err: LedgerError) {
        self.lock().fail_warehouse_counter = Some(err);
    }

    pub fn clear_warehouse_counter_failure(&self) {
        self.lock().fail_warehouse_counter = None;
    }

    // -- inspection ---------------------------------------------------------

    pub fn writes(&self) -> Vec<LedgerWriteOp> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn lease(&self, ledger_id: i64) -> Option<LedgerLease> {
        self.lock().leases.get(&ledger_id).cloned()
    }

    pub fn warehouse(&self, ledger_id: i64) -> Option<LedgerWarehouse> {
        self.lock().warehouses.get(&ledger_id).cloned()
    }

    fn next_tx_ref(inner: &mut Inner) -> String {
        inner.next_tx += 1;
        format!("0xtx{:06}", inner.next_tx)
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(1)
    }

    async fn warehouse_counter(&self) -> Result<i64, LedgerError> {
        let inner = self.lock();
        if let Some(err) = &inner.fail_warehouse_counter {
            return Err(err.clone());
        }
        Ok(inner.warehouse_counter)
    }

    async fn lease_counter(&self) -> Result<i64, LedgerError> {
        Ok(self.lock().lease_counter)
    }

    async fn get_warehouse(&self, ledger_id: i64) -> Result<Option<LedgerWarehouse>, LedgerError> {
        Ok(self
            .lock()
            .warehouses
            .get(&ledger_id)
            .filter(|w| w.exists())
            .cloned())
    }

    async fn get_lease(&self, ledger_id: i64) -> Result<Option<LedgerLease>, LedgerError> {
        let inner = self.lock();
        if let Some(err) = inner.fail_get_lease.get(&ledger_id) {
            return Err(err.clone());
        }
        Ok(inner.leases.get(&ledger_id).filter(|l| l.exists()).cloned())
    }

    async fn register_warehouse(
        &self,
        reg: &WarehouseRegistration,
    ) -> Result<Registered, LedgerError> {
        let mut inner = self.lock();
        inner.writes.push(LedgerWriteOp::RegisterWarehouse {
            name: reg.name.clone(),
        });
        if let Some(err) = inner.fail_register.take() {
            return Err(err);
        }
        inner.warehouse_counter += 1;
        let ledger_id = inner.warehouse_counter;
        let owner = inner.caller.clone();
        inner.warehouses.insert(
            ledger_id,
            LedgerWarehouse {
                owner,
                name: reg.name.clone(),
                location: reg.location.clone(),
                total_area: reg.total_area,
                available_area: reg.total_area,
                price_per_unit_per_day: reg.price_per_unit_per_day,
                image_url: reg.image_url.clone(),
                description: reg.description.clone(),
                is_active: true,
            },
        );
        let tx_ref = Self::next_tx_ref(&mut inner);
        Ok(Registered { ledger_id, tx_ref })
    }

    async fn update_warehouse(
        &self,
        ledger_id: i64,
        update: &WarehouseUpdate,
    ) -> Result<Confirmation, LedgerError> {
        let mut inner = self.lock();
        inner
            .writes
            .push(LedgerWriteOp::UpdateWarehouse { ledger_id });
        let Some(wh) = inner.warehouses.get_mut(&ledger_id) else {
            return Err(LedgerError::Reverted {
                reason: "Warehouse does not exist".to_string(),
            });
        };
        wh.name = update.name.clone();
        wh.location = update.location.clone();
        wh.price_per_unit_per_day = update.price_per_unit_per_day;
        wh.image_url = update.image_url.clone();
        wh.description = update.description.clone();
        wh.is_active = update.is_active;
        let tx_ref = Self::next_tx_ref(&mut inner);
        Ok(Confirmation { tx_ref })
    }

    async fn create_lease(
        &self,
        warehouse_ledger_id: i64,
        area: i64,
        duration_days: i64,
        payment: i64,
    ) -> Result<Registered, LedgerError> {
        let mut inner = self.lock();
        inner.writes.push(LedgerWriteOp::CreateLease {
            warehouse_ledger_id,
        });
        let now_ts = inner.now_ts;
        let tenant = inner.caller.clone();
        let Some(wh) = inner.warehouses.get_mut(&warehouse_ledger_id) else {
            return Err(LedgerError::Reverted {
                reason: "Warehouse does not exist".to_string(),
            });
        };
        if !wh.is_active {
            return Err(LedgerError::Reverted {
                reason: "Warehouse is not active".to_string(),
            });
        }
        if wh.available_area < area {
            return Err(LedgerError::Reverted {
                reason: "Insufficient available area".to_string(),
            });
        }
        wh.available_area -= area;
        inner.lease_counter += 1;
        let ledger_id = inner.lease_counter;
        inner.leases.insert(
            ledger_id,
            LedgerLease {
                tenant,
                warehouse_id: warehouse_ledger_id,
                area,
                start_ts: now_ts,
                end_ts: now_ts + duration_days * 86_400,
                total_price: payment,
                is_active: true,
                is_completed: false,
            },
        );
        let tx_ref = Self::next_tx_ref(&mut inner);
        Ok(Registered { ledger_id, tx_ref })
    }

    async fn complete_lease(&self, ledger_id: i64) -> Result<Confirmation, LedgerError> {
        let mut inner = self.lock();
        inner.writes.push(LedgerWriteOp::CompleteLease { ledger_id });
        if let Some(err) = inner.fail_complete_lease.get(&ledger_id) {
            return Err(err.clone());
        }
        let now_ts = inner.now_ts;
        let Some(lease) = inner.leases.get_mut(&ledger_id) else {
            return Err(LedgerError::Reverted {
                reason: "Lease does not exist".to_string(),
            });
        };
        if lease.is_completed {
            return Err(LedgerError::Reverted {
                reason: "Lease already completed".to_string(),
            });
        }
        if !lease.is_active {
            return Err(LedgerError::Reverted {
                reason: "Lease is not active".to_string(),
            });
        }
        if lease.end_ts > now_ts {
            return Err(LedgerError::Reverted {
                reason: "Lease has not ended yet".to_string(),
            });
        }
        lease.is_active = false;
        lease.is_completed = true;
        let (warehouse_id, area) = (lease.warehouse_id, lease.area);
        if let Some(wh) = inner.warehouses.get_mut(&warehouse_id) {
            wh.available_area += area;
        }
        let tx_ref = Self::next_tx_ref(&mut inner);
        Ok(Confirmation { tx_ref })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whs_schemas::RevertKind;

    fn registration(name: &str, total_area: i64) -> WarehouseRegistration {
        WarehouseRegistration {
            name: name.to_string(),
            location: "Pier 4".to_string(),
            total_area,
            price_per_unit_per_day: 5,
            image_url: String::new(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn create_lease_reserves_area_and_completion_releases_it() {
        let ledger = MemoryLedger::new();
        ledger.set_now_ts(1_000_000);

        let wh = ledger
            .register_warehouse(&registration("Warehouse", 1_000))
            .await
            .unwrap();
        let lease = ledger
            .create_lease(wh.ledger_id, 400, 10, 2_000)
            .await
            .unwrap();
        assert_eq!(ledger.warehouse(wh.ledger_id).unwrap().available_area, 600);

        // Not ended yet: the program refuses completion.
        let err = ledger.complete_lease(lease.ledger_id).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::NotYetEnded));

        ledger.set_now_ts(1_000_000 + 10 * 86_400);
        ledger.complete_lease(lease.ledger_id).await.unwrap();
        assert_eq!(ledger.warehouse(wh.ledger_id).unwrap().available_area, 1_000);

        let err = ledger.complete_lease(lease.ledger_id).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::AlreadyCompleted));
    }

    #[tokio::test]
    async fn create_lease_rejects_insufficient_area_and_inactive_warehouse() {
        let ledger = MemoryLedger::new();
        let wh = ledger
            .register_warehouse(&registration("Warehouse", 300))
            .await
            .unwrap();

        let err = ledger.create_lease(wh.ledger_id, 400, 10, 2_000).await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { .. }));

        ledger
            .update_warehouse(
                wh.ledger_id,
                &WarehouseUpdate {
                    name: "Warehouse".to_string(),
                    location: "Pier 4".to_string(),
                    price_per_unit_per_day: 5,
                    image_url: String::new(),
                    description: String::new(),
                    is_active: false,
                },
            )
            .await
            .unwrap();

        let err = ledger.create_lease(wh.ledger_id, 100, 10, 500).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::Inactive));
    }
}
