//! Pure drift classification: compares an already-fetched pair of views
//! with no I/O, so it is unit-testable independent of network conditions.

use whs_schemas::{LeaseRecord, LedgerLease, LedgerWarehouse, WarehouseRecord};

/// Evidence of one field disagreeing between store and ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub local: String,
    pub ledger: String,
}

/// Relationship between a relational record and its ledger counterpart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Drift {
    /// No action.
    Consistent,
    /// Ledger is ahead; the local record is overwritten from the ledger
    /// view (ledger wins). No ledger write is issued.
    LocallyStale(Vec<FieldDiff>),
    /// The ledger has no record for an id the store believes is valid
    /// (reset on an ephemeral network, or corrupted linkage). Terminal:
    /// heal locally, never retry against the ledger.
    Orphaned,
}

impl Drift {
    pub fn is_orphaned(&self) -> bool {
        matches!(self, Drift::Orphaned)
    }
}

fn push_diff(diffs: &mut Vec<FieldDiff>, field: &'static str, local: String, ledger: String) {
    diffs.push(FieldDiff {
        field,
        local,
        ledger,
    });
}

/// Classify a lease row against its ledger view.
pub fn classify_lease(local: &LeaseRecord, view: Option<&LedgerLease>) -> Drift {
    let Some(view) = view.filter(|v| v.exists()) else {
        return Drift::Orphaned;
    };

    let mut diffs: Vec<FieldDiff> = Vec::new();

    if !local.tenant_address.eq_ignore_ascii_case(&view.tenant) {
        push_diff(
            &mut diffs,
            "tenant_address",
            local.tenant_address.clone(),
            view.tenant.clone(),
        );
    }
    if local.area != view.area {
        push_diff(
            &mut diffs,
            "area",
            local.area.to_string(),
            view.area.to_string(),
        );
    }
    if local.total_price != view.total_price {
        push_diff(
            &mut diffs,
            "total_price",
            local.total_price.to_string(),
            view.total_price.to_string(),
        );
    }
    if local.is_active != view.is_active {
        push_diff(
            &mut diffs,
            "is_active",
            local.is_active.to_string(),
            view.is_active.to_string(),
        );
    }
    if local.is_completed != view.is_completed {
        push_diff(
            &mut diffs,
            "is_completed",
            local.is_completed.to_string(),
            view.is_completed.to_string(),
        );
    }

    if diffs.is_empty() {
        Drift::Consistent
    } else {
        Drift::LocallyStale(diffs)
    }
}

/// Classify a warehouse row against its ledger view. Availability and
/// activity are the ledger-owned fields the store must track.
pub fn classify_warehouse(local: &WarehouseRecord, view: Option<&LedgerWarehouse>) -> Drift {
    let Some(view) = view.filter(|v| v.exists()) else {
        return Drift::Orphaned;
    };

    let mut diffs: Vec<FieldDiff> = Vec::new();

    if local.available_area != view.available_area {
        push_diff(
            &mut diffs,
            "available_area",
            local.available_area.to_string(),
            view.available_area.to_string(),
        );
    }
    if local.total_area != view.total_area {
        push_diff(
            &mut diffs,
            "total_area",
            local.total_area.to_string(),
            view.total_area.to_string(),
        );
    }
    if local.is_active != view.is_active {
        push_diff(
            &mut diffs,
            "is_active",
            local.is_active.to_string(),
            view.is_active.to_string(),
        );
    }

    if diffs.is_empty() {
        Drift::Consistent
    } else {
        Drift::LocallyStale(diffs)
    }
}
