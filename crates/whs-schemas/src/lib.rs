//! Shared domain types for the warehouse-sharing reconciliation core.
//!
//! Pure data shapes only: relational rows, ledger views, the ledger error
//! taxonomy, and typed ledger events. No I/O lives here so every consumer
//! (engine, gateway, store, test doubles) agrees on one vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel `ledger_id` meaning "not yet registered on the ledger".
pub const UNREGISTERED: i64 = 0;

/// The ledger returns a zero-valued address for a struct slot that was
/// never written (or was wiped by a reset). Callers must treat that as
/// NotFound, not as a record.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// True when `addr` is empty or all-zero (with or without the 0x prefix).
pub fn is_zero_address(addr: &str) -> bool {
    let hex = addr.strip_prefix("0x").unwrap_or(addr);
    hex.is_empty() || hex.chars().all(|c| c == '0')
}

// ---------------------------------------------------------------------------
// Relational rows
// ---------------------------------------------------------------------------

/// A warehouse row in the relational store.
///
/// `ledger_id == 0` means the row is purely local (pending registration)
/// and excluded from leasing. Once registered, `available_area` must track
/// the ledger's value after every lease create/complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRecord {
    pub id: i64,
    pub ledger_id: i64,
    pub owner_address: String,
    pub name: String,
    pub location: String,
    pub total_area: i64,
    pub available_area: i64,
    /// Integer price in the smallest currency unit per area unit per day.
    pub price_per_unit_per_day: i64,
    pub is_active: bool,
    pub image_url: String,
    pub description: String,
}

impl WarehouseRecord {
    pub fn is_registered(&self) -> bool {
        self.ledger_id > UNREGISTERED
    }
}

/// A lease row in the relational store.
///
/// An active lease's `area` has been subtracted from its warehouse's
/// `available_area` and must be restored exactly once on completion or
/// cancellation. `is_completed` implies `!is_active`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub id: i64,
    pub ledger_id: i64,
    pub warehouse_id: i64,
    pub tenant_address: String,
    pub area: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_price: i64,
    pub is_active: bool,
    pub is_completed: bool,
    pub tx_reference: Option<String>,
}

// ---------------------------------------------------------------------------
// Ledger views (read-only from the engine's perspective)
// ---------------------------------------------------------------------------

/// Warehouse state as reported by the ledger program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWarehouse {
    pub owner: String,
    pub name: String,
    pub location: String,
    pub total_area: i64,
    pub available_area: i64,
    pub price_per_unit_per_day: i64,
    pub image_url: String,
    pub description: String,
    pub is_active: bool,
}

impl LedgerWarehouse {
    /// A zero owner address means the slot was never written (or the
    /// ledger state was reset).
    pub fn exists(&self) -> bool {
        !is_zero_address(&self.owner)
    }
}

/// Lease state as reported by the ledger program. Timestamps are unix
/// seconds as the program stores them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLease {
    pub tenant: String,
    pub warehouse_id: i64,
    pub area: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub total_price: i64,
    pub is_active: bool,
    pub is_completed: bool,
}

impl LedgerLease {
    /// A zero tenant address means the slot was never written (or the
    /// ledger state was reset).
    pub fn exists(&self) -> bool {
        !is_zero_address(&self.tenant)
    }
}

// ---------------------------------------------------------------------------
// Write payloads and outcomes
// ---------------------------------------------------------------------------

/// Fields sent to the ledger when registering a warehouse. Free-text
/// fields must already be sanitized by the caller; the ledger call has no
/// notion of their original encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRegistration {
    pub name: String,
    pub location: String,
    pub total_area: i64,
    pub price_per_unit_per_day: i64,
    pub image_url: String,
    pub description: String,
}

/// Fields sent to the ledger when updating a registered warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseUpdate {
    pub name: String,
    pub location: String,
    pub price_per_unit_per_day: i64,
    pub image_url: String,
    pub description: String,
    pub is_active: bool,
}

/// Outcome of a confirmed write that allocated a new ledger id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registered {
    pub ledger_id: i64,
    pub tx_ref: String,
}

/// Outcome of a confirmed write that mutated an existing record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_ref: String,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Classified revert reasons from the ledger program.
///
/// Only `NotYetEnded` is retryable: local and ledger clocks can disagree
/// near a lease's end, and the next tick resolves it. Everything else is
/// terminal for the attempted write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevertKind {
    NotYetEnded,
    AlreadyCompleted,
    NotAuthorized,
    Inactive,
    Other,
}

impl RevertKind {
    /// Classify a revert reason string returned by the ledger node.
    pub fn classify(reason: &str) -> Self {
        let r = reason.to_ascii_lowercase();
        if r.contains("not ended") || r.contains("not yet ended") || r.contains("not expired") {
            RevertKind::NotYetEnded
        } else if r.contains("already completed") {
            RevertKind::AlreadyCompleted
        } else if r.contains("not authorized") || r.contains("only owner") {
            RevertKind::NotAuthorized
        } else if r.contains("not active") || r.contains("inactive") {
            RevertKind::Inactive
        } else {
            RevertKind::Other
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RevertKind::NotYetEnded)
    }
}

/// Failure modes of a ledger read or write, distinguished because the
/// engine acts differently on each:
///
/// - `Connectivity` / `Rpc`: transport or node trouble; nothing is known
///   about the write. Retry next tick.
/// - `Reverted`: the write reached the ledger and was explicitly rejected.
///   Classified by reason into retryable vs terminal.
/// - `ConfirmationTimeout`: submitted but confirmation unknown. Transient;
///   local state must not be mutated.
/// - `Decode`: the node answered with a shape we do not understand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    Connectivity(String),
    Rpc { code: i64, message: String },
    Reverted { reason: String },
    ConfirmationTimeout,
    Decode(String),
}

impl LedgerError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LedgerError::Connectivity(_))
    }

    /// Revert classification, if this is a revert at all.
    pub fn revert_kind(&self) -> Option<RevertKind> {
        match self {
            LedgerError::Reverted { reason } => Some(RevertKind::classify(reason)),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Connectivity(msg) => write!(f, "ledger unreachable: {msg}"),
            LedgerError::Rpc { code, message } => write!(f, "ledger rpc error {code}: {message}"),
            LedgerError::Reverted { reason } => write!(f, "ledger write reverted: {reason}"),
            LedgerError::ConfirmationTimeout => {
                write!(f, "ledger write submitted but confirmation timed out")
            }
            LedgerError::Decode(msg) => write!(f, "ledger response decode failed: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

// ---------------------------------------------------------------------------
// Typed ledger events
// ---------------------------------------------------------------------------

/// Structured events decoded from a transaction receipt's log entries.
/// The engine only ever sees these; raw logs stay inside the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    WarehouseRegistered { ledger_id: i64 },
    LeaseCreated { ledger_id: i64 },
    LeaseCompleted { ledger_id: i64 },
}

/// Decode one receipt log entry (`{"name": ..., "args": {...}}`) into a
/// typed event. Unknown names and malformed payloads yield `None` — the
/// caller skips them rather than guessing.
pub fn decode_event(log: &Value) -> Option<LedgerEvent> {
    let name = log.get("name")?.as_str()?;
    let args = log.get("args")?;
    let id = args.get("id")?.as_i64()?;
    match name {
        "WarehouseRegistered" => Some(LedgerEvent::WarehouseRegistered { ledger_id: id }),
        "LeaseCreated" => Some(LedgerEvent::LeaseCreated { ledger_id: id }),
        "LeaseCompleted" => Some(LedgerEvent::LeaseCompleted { ledger_id: id }),
        _ => None,
    }
}
