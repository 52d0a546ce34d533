//! The reconciliation engine: Warehouse Sync and Lease Expiry Sweep.
//!
//! One implementation, two call sites (the daemon's scheduler tick and the
//! on-demand HTTP trigger). A pass never aborts wholesale on a single
//! record's failure; only failures establishing the pass itself (candidate
//! query, counter pre-check) abort it, with no partial writes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::drift::{classify_lease, Drift};
use crate::ports::{LedgerGateway, StateStore};
use crate::sanitize::{clamp_description, sanitize_text};
use crate::types::{SweepReport, SyncReport};
use whs_audit::HealJournal;
use whs_schemas::{LeaseRecord, WarehouseRegistration};

/// Per-lease sweep outcome. Failures are represented as `Err` by
/// [`ReconcileEngine::sweep_one`] and isolated by the caller.
enum LeaseOutcome {
    /// Terminal local state reached (ledger write and/or local heal).
    Completed,
    /// Intentionally left untouched for the next tick.
    Deferred(&'static str),
}

pub struct ReconcileEngine<L, S> {
    ledger: L,
    store: S,
    /// Heal journal; every corrective local write is recorded with
    /// before/after state. Absent in some test setups.
    journal: Option<Mutex<HealJournal>>,
}

impl<L: LedgerGateway, S: StateStore> ReconcileEngine<L, S> {
    pub fn new(ledger: L, store: S) -> Self {
        Self {
            ledger,
            store,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: HealJournal) -> Self {
        self.journal = Some(Mutex::new(journal));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn record_heal(
        &self,
        action: &str,
        subject: &str,
        before: serde_json::Value,
        after: serde_json::Value,
    ) {
        let Some(journal) = &self.journal else {
            return;
        };
        match journal.lock() {
            Ok(mut j) => {
                if let Err(e) = j.append(action, subject, before, after) {
                    warn!(action, subject, error = %e, "heal journal append failed");
                }
            }
            Err(_) => warn!(action, subject, "heal journal lock poisoned"),
        }
    }

    // -----------------------------------------------------------------------
    // Warehouse Sync pass
    // -----------------------------------------------------------------------

    /// Push active, unregistered warehouses to the ledger in ascending
    /// local-id order, resetting stale links first when the ledger's
    /// counter proves a reset happened.
    pub async fn run_warehouse_sync(&self) -> Result<SyncReport> {
        let counter = self
            .ledger
            .warehouse_counter()
            .await
            .context("warehouse counter read failed; aborting sync pass")?;
        let linked = self.store.linked_active_warehouse_count().await?;

        // A counter smaller than the number of rows claiming a link is
        // conclusive: no old ledger_id can still resolve correctly.
        if counter < linked {
            warn!(
                counter,
                linked, "ledger counter below linked local count; treating as ledger reset"
            );
            let reset = self.store.reset_ledger_links().await?;
            self.record_heal(
                "warehouse.links_reset",
                "warehouse:*",
                json!({ "linked": linked, "ledger_counter": counter }),
                json!({ "linked": 0, "rows_reset": reset }),
            );
        }

        let candidates = self.store.unregistered_warehouses().await?;
        if candidates.is_empty() {
            debug!("no warehouses pending registration");
            return Ok(SyncReport::default());
        }
        info!(count = candidates.len(), "syncing warehouses to ledger");

        let mut report = SyncReport::default();
        for wh in candidates {
            let reg = WarehouseRegistration {
                name: sanitize_text(&wh.name),
                location: sanitize_text(&wh.location),
                total_area: wh.total_area,
                price_per_unit_per_day: wh.price_per_unit_per_day,
                image_url: sanitize_text(&wh.image_url),
                description: clamp_description(&sanitize_text(&wh.description)),
            };
            match self.ledger.register_warehouse(&reg).await {
                Ok(registered) => {
                    self.store
                        .set_warehouse_ledger_id(wh.id, registered.ledger_id)
                        .await?;
                    self.record_heal(
                        "warehouse.registered",
                        &format!("warehouse:{}", wh.id),
                        json!({ "ledger_id": 0 }),
                        json!({ "ledger_id": registered.ledger_id, "tx_ref": registered.tx_ref }),
                    );
                    info!(
                        warehouse_id = wh.id,
                        ledger_id = registered.ledger_id,
                        tx_ref = %registered.tx_ref,
                        "warehouse registered on ledger"
                    );
                    report.synced += 1;
                }
                Err(e) => {
                    warn!(warehouse_id = wh.id, error = %e, "warehouse registration failed; skipping");
                    report.skipped += 1;
                }
            }
        }

        info!(synced = report.synced, skipped = report.skipped, "warehouse sync pass done");
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Lease Expiry Sweep
    // -----------------------------------------------------------------------

    /// Complete expired leases on the ledger and/or heal local state.
    /// Earliest-expired leases are freed first so their restored area
    /// unblocks earlier-waiting tenants.
    pub async fn run_expiry_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self
            .store
            .expired_active_leases(now)
            .await
            .context("expired lease query failed; aborting sweep")?;

        if expired.is_empty() {
            debug!("no expired leases");
            return Ok(SweepReport::default());
        }
        info!(count = expired.len(), "sweeping expired leases");

        let mut report = SweepReport::default();
        for lease in &expired {
            match self.sweep_one(lease, now).await {
                Ok(LeaseOutcome::Completed) => report.completed += 1,
                Ok(LeaseOutcome::Deferred(why)) => {
                    debug!(lease_id = lease.id, why, "lease left for next tick");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(lease_id = lease.id, error = %e, "lease sweep failed; continuing");
                    report.failed += 1;
                }
            }
        }

        info!(completed = report.completed, failed = report.failed, "expiry sweep done");
        Ok(report)
    }

    async fn sweep_one(&self, lease: &LeaseRecord, now: DateTime<Utc>) -> Result<LeaseOutcome> {
        let view = self.ledger.get_lease(lease.ledger_id).await?;

        match (classify_lease(lease, view.as_ref()), view) {
            (Drift::Orphaned, _) | (_, None) => {
                // Ledger has no record (reset or bad linkage): terminal.
                // Complete locally, restore the reserved area, no ledger write.
                self.store.set_lease_flags(lease.id, false, true).await?;
                if lease.is_active {
                    self.store
                        .restore_warehouse_area(lease.warehouse_id, lease.area)
                        .await?;
                }
                self.record_heal(
                    "lease.orphan_healed",
                    &format!("lease:{}", lease.id),
                    json!({
                        "is_active": lease.is_active,
                        "is_completed": lease.is_completed,
                        "ledger_id": lease.ledger_id,
                    }),
                    json!({
                        "is_active": false,
                        "is_completed": true,
                        "restored_area": lease.area,
                        "warehouse_id": lease.warehouse_id,
                    }),
                );
                info!(
                    lease_id = lease.id,
                    ledger_id = lease.ledger_id,
                    "lease missing on ledger; completed locally"
                );
                Ok(LeaseOutcome::Completed)
            }

            (drift, Some(view)) if view.is_completed || !view.is_active => {
                // Ledger already released this lease: copy its flags, restore
                // the area exactly once. A completeLease write here would
                // only revert.
                if let Drift::LocallyStale(diffs) = &drift {
                    debug!(lease_id = lease.id, ?diffs, "ledger ahead of local lease state");
                }
                self.store
                    .set_lease_flags(lease.id, view.is_active, view.is_completed)
                    .await?;
                let restored = lease.is_active;
                if restored {
                    self.store
                        .restore_warehouse_area(lease.warehouse_id, lease.area)
                        .await?;
                }
                self.record_heal(
                    "lease.flags_copied",
                    &format!("lease:{}", lease.id),
                    json!({
                        "is_active": lease.is_active,
                        "is_completed": lease.is_completed,
                    }),
                    json!({
                        "is_active": view.is_active,
                        "is_completed": view.is_completed,
                        "restored_area": if restored { lease.area } else { 0 },
                    }),
                );
                info!(lease_id = lease.id, "lease state copied from ledger");
                Ok(LeaseOutcome::Completed)
            }

            (_, Some(view)) => {
                // Ledger still considers the lease active. Only complete it
                // when the ledger's own clock agrees it ended.
                if view.end_ts > now.timestamp() {
                    return Ok(LeaseOutcome::Deferred("ledger end time not reached"));
                }

                match self.ledger.complete_lease(lease.ledger_id).await {
                    Ok(confirmation) => {
                        self.store.set_lease_flags(lease.id, false, true).await?;
                        // The program released the area on-chain; prefer its
                        // value, fall back to a local restore if unreadable.
                        match self.ledger.get_warehouse(view.warehouse_id).await {
                            Ok(Some(lw)) => {
                                self.store
                                    .set_available_area_by_ledger_id(
                                        view.warehouse_id,
                                        lw.available_area,
                                    )
                                    .await?;
                            }
                            Ok(None) | Err(_) => {
                                self.store
                                    .restore_warehouse_area(lease.warehouse_id, lease.area)
                                    .await?;
                            }
                        }
                        self.record_heal(
                            "lease.completed",
                            &format!("lease:{}", lease.id),
                            json!({
                                "is_active": lease.is_active,
                                "is_completed": lease.is_completed,
                            }),
                            json!({
                                "is_active": false,
                                "is_completed": true,
                                "tx_ref": confirmation.tx_ref,
                            }),
                        );
                        info!(
                            lease_id = lease.id,
                            ledger_id = lease.ledger_id,
                            tx_ref = %confirmation.tx_ref,
                            "lease completed on ledger"
                        );
                        Ok(LeaseOutcome::Completed)
                    }
                    // Local and ledger clocks can disagree near the boundary;
                    // the next tick resolves it. Never mark completed locally
                    // without ledger confirmation in this branch.
                    Err(e) if e.revert_kind().is_some_and(|k| k.is_retryable()) => {
                        Ok(LeaseOutcome::Deferred("ledger reports not yet ended"))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}
