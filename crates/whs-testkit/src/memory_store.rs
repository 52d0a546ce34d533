//! Plain in-memory row store double.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use whs_reconcile::StateStore;
use whs_schemas::{LeaseRecord, WarehouseRecord};

#[derive(Default)]
struct Inner {
    warehouses: BTreeMap<i64, WarehouseRecord>,
    leases: BTreeMap<i64, LeaseRecord>,
}

/// In-memory stand-in for the relational store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Test double: a poisoned lock means a test already panicked.
        self.inner.lock().expect("MemoryStore lock poisoned")
    }

    pub fn insert_warehouse(&self, wh: WarehouseRecord) {
        self.lock().warehouses.insert(wh.id, wh);
    }

    pub fn insert_lease(&self, lease: LeaseRecord) {
        self.lock().leases.insert(lease.id, lease);
    }

    pub fn warehouse(&self, id: i64) -> Option<WarehouseRecord> {
        self.lock().warehouses.get(&id).cloned()
    }

    pub fn lease(&self, id: i64) -> Option<LeaseRecord> {
        self.lock().leases.get(&id).cloned()
    }

    pub fn all_leases(&self) -> Vec<LeaseRecord> {
        self.lock().leases.values().cloned().collect()
    }

    pub fn all_warehouses(&self) -> Vec<WarehouseRecord> {
        self.lock().warehouses.values().cloned().collect()
    }

    /// `available_area + Σ(area of active leases) == total_area` for the
    /// given warehouse. The invariant every pass must preserve.
    pub fn area_conserved(&self, warehouse_id: i64) -> bool {
        let inner = self.lock();
        let Some(wh) = inner.warehouses.get(&warehouse_id) else {
            return false;
        };
        let reserved: i64 = inner
            .leases
            .values()
            .filter(|l| l.warehouse_id == warehouse_id && l.is_active)
            .map(|l| l.area)
            .sum();
        wh.available_area + reserved == wh.total_area
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn unregistered_warehouses(&self) -> Result<Vec<WarehouseRecord>> {
        // BTreeMap iteration is already ascending by local id.
        Ok(self
            .lock()
            .warehouses
            .values()
            .filter(|w| w.is_active && w.ledger_id == 0)
            .cloned()
            .collect())
    }

    async fn linked_active_warehouse_count(&self) -> Result<i64> {
        Ok(self
            .lock()
            .warehouses
            .values()
            .filter(|w| w.is_active && w.ledger_id > 0)
            .count() as i64)
    }

    async fn reset_ledger_links(&self) -> Result<u64> {
        let mut inner = self.lock();
        let mut n = 0;
        for wh in inner.warehouses.values_mut() {
            if wh.is_active && wh.ledger_id != 0 {
                wh.ledger_id = 0;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn set_warehouse_ledger_id(&self, id: i64, ledger_id: i64) -> Result<()> {
        let mut inner = self.lock();
        let wh = inner
            .warehouses
            .get_mut(&id)
            .ok_or_else(|| anyhow!("warehouse {id} not found"))?;
        wh.ledger_id = ledger_id;
        Ok(())
    }

    async fn get_warehouse(&self, id: i64) -> Result<Option<WarehouseRecord>> {
        Ok(self.lock().warehouses.get(&id).cloned())
    }

    async fn expired_active_leases(&self, now: DateTime<Utc>) -> Result<Vec<LeaseRecord>> {
        let mut expired: Vec<LeaseRecord> = self
            .lock()
            .leases
            .values()
            .filter(|l| l.is_active && !l.is_completed && l.end_date < now)
            .cloned()
            .collect();
        expired.sort_by_key(|l| l.end_date);
        Ok(expired)
    }

    async fn set_lease_flags(&self, id: i64, is_active: bool, is_completed: bool) -> Result<()> {
        let mut inner = self.lock();
        let lease = inner
            .leases
            .get_mut(&id)
            .ok_or_else(|| anyhow!("lease {id} not found"))?;
        lease.is_active = is_active;
        lease.is_completed = is_completed;
        Ok(())
    }

    async fn restore_warehouse_area(&self, warehouse_id: i64, area: i64) -> Result<()> {
        let mut inner = self.lock();
        let wh = inner
            .warehouses
            .get_mut(&warehouse_id)
            .ok_or_else(|| anyhow!("warehouse {warehouse_id} not found"))?;
        wh.available_area += area;
        Ok(())
    }

    async fn set_available_area_by_ledger_id(
        &self,
        ledger_id: i64,
        available_area: i64,
    ) -> Result<()> {
        let mut inner = self.lock();
        let wh = inner
            .warehouses
            .values_mut()
            .find(|w| w.ledger_id == ledger_id)
            .ok_or_else(|| anyhow!("no warehouse linked to ledger id {ledger_id}"))?;
        wh.available_area = available_area;
        Ok(())
    }
}
