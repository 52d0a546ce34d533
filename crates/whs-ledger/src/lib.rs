//! Chain Gateway: the single client through which the engine reads and
//! writes the deployed ledger program.
//!
//! # Contract
//! - Reads go through `ledger_call`; the zero-address sentinel the program
//!   returns for never-written slots is mapped to `None` here, so callers
//!   check an `Option`, not a magic value.
//! - Writes go through `ledger_sendTransaction` and block until the
//!   receipt reports confirmed or reverted, bounded by the configured
//!   timeout. A revert is a distinct outcome from a transport failure and
//!   from a confirmation timeout.
//! - Writes from the configured credential are serialized by an internal
//!   async mutex: one in-process writer per credential, so sequence
//!   numbers cannot race. This replaces the sleep-between-calls throttle
//!   the system previously relied on.
//! - Receipt logs are decoded into typed [`whs_schemas::LedgerEvent`]s;
//!   undecodable logs are skipped, never guessed at.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use whs_reconcile::LedgerGateway;
use whs_schemas::{
    decode_event, Confirmation, LedgerError, LedgerEvent, LedgerLease, LedgerWarehouse, Registered,
    WarehouseRegistration, WarehouseUpdate,
};

/// Bounded gas limits per call, sized to each call's complexity.
#[derive(Clone, Copy, Debug)]
pub struct GasLimits {
    pub register_warehouse: u64,
    pub update_warehouse: u64,
    pub create_lease: u64,
    pub complete_lease: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            register_warehouse: 1_000_000,
            update_warehouse: 1_000_000,
            create_lease: 800_000,
            complete_lease: 500_000,
        }
    }
}

/// Connection parameters for one ledger program deployment, injected at
/// construction. The signer key never appears in `Debug` output.
#[derive(Clone)]
pub struct LedgerEndpoint {
    pub rpc_url: String,
    pub program_address: String,
    pub signer_address: String,
    pub signer_key: String,
    pub confirm_timeout: Duration,
    pub gas: GasLimits,
}

impl std::fmt::Debug for LedgerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEndpoint")
            .field("rpc_url", &self.rpc_url)
            .field("program_address", &self.program_address)
            .field("signer_address", &self.signer_address)
            .field("signer_key", &"<REDACTED>")
            .field("confirm_timeout", &self.confirm_timeout)
            .field("gas", &self.gas)
            .finish()
    }
}

/// A parsed transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_ref: String,
    pub events: Vec<LedgerEvent>,
}

/// JSON-RPC client for the ledger node.
pub struct RpcLedger {
    http: reqwest::Client,
    endpoint: LedgerEndpoint,
    /// Single in-process writer per credential.
    write_lock: Mutex<()>,
    next_id: std::sync::atomic::AtomicU64,
}

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

impl RpcLedger {
    pub fn new(endpoint: LedgerEndpoint) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            // Builder only fails on TLS backend misconfiguration; the
            // rustls backend is compiled in.
            .unwrap_or_default();
        Self {
            http,
            endpoint,
            write_lock: Mutex::new(()),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &LedgerEndpoint {
        &self.endpoint
    }

    // -- transport ----------------------------------------------------------

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.endpoint.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Connectivity(e.to_string()))?;

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        parse_rpc_result(&payload)
    }

    /// Read-only program call.
    async fn call(&self, method: &str, args: Value) -> Result<Value, LedgerError> {
        self.rpc(
            "ledger_call",
            json!([{
                "to": self.endpoint.program_address,
                "method": method,
                "args": args,
            }]),
        )
        .await
    }

    /// Submit a write and wait for confirmed-or-reverted, bounded by the
    /// configured timeout. Holds the write lock for the full wait so the
    /// next write observes the settled sequence number.
    async fn send(
        &self,
        method: &str,
        args: Value,
        gas: u64,
        payment: Option<i64>,
    ) -> Result<Receipt, LedgerError> {
        let _writer = self.write_lock.lock().await;

        let mut tx = json!({
            "from": self.endpoint.signer_address,
            "to": self.endpoint.program_address,
            "method": method,
            "args": args,
            "gas": gas,
        });
        if let Some(value) = payment {
            tx["value"] = json!(value);
        }

        let tx_hash = self
            .rpc("ledger_sendTransaction", json!([tx]))
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Decode("tx hash is not a string".to_string()))?;
        debug!(method, tx_ref = %tx_hash, "write submitted; waiting for confirmation");

        let deadline = tokio::time::Instant::now() + self.endpoint.confirm_timeout;
        loop {
            let payload = self
                .rpc("ledger_getTransactionReceipt", json!([tx_hash]))
                .await?;
            match parse_receipt(&tx_hash, &payload)? {
                ReceiptState::Pending => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(method, tx_ref = %tx_hash, "confirmation wait exceeded bound");
                        return Err(LedgerError::ConfirmationTimeout);
                    }
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
                ReceiptState::Confirmed(receipt) => return Ok(receipt),
                ReceiptState::Reverted { reason } => {
                    return Err(LedgerError::Reverted { reason })
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing (pure, unit-tested)
// ---------------------------------------------------------------------------

/// Extract `result` from a JSON-RPC envelope, mapping `error` objects.
fn parse_rpc_result(payload: &Value) -> Result<Value, LedgerError> {
    if let Some(err) = payload.get("error") {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown rpc error")
            .to_string();
        return Err(LedgerError::Rpc { code, message });
    }
    payload
        .get("result")
        .cloned()
        .ok_or_else(|| LedgerError::Decode("rpc envelope missing result".to_string()))
}

enum ReceiptState {
    Pending,
    Confirmed(Receipt),
    Reverted { reason: String },
}

/// Interpret a receipt query result. `null` means still pending.
fn parse_receipt(tx_ref: &str, payload: &Value) -> Result<ReceiptState, LedgerError> {
    if payload.is_null() {
        return Ok(ReceiptState::Pending);
    }
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::Decode("receipt missing status".to_string()))?;
    match status {
        "confirmed" => {
            let events = payload
                .get("events")
                .and_then(Value::as_array)
                .map(|logs| logs.iter().filter_map(decode_event).collect())
                .unwrap_or_default();
            Ok(ReceiptState::Confirmed(Receipt {
                tx_ref: tx_ref.to_string(),
                events,
            }))
        }
        "reverted" => {
            let reason = payload
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("execution reverted")
                .to_string();
            Ok(ReceiptState::Reverted { reason })
        }
        other => Err(LedgerError::Decode(format!("unknown receipt status {other:?}"))),
    }
}

fn view_from_value<T: serde::de::DeserializeOwned>(v: Value) -> Result<T, LedgerError> {
    serde_json::from_value(v).map_err(|e| LedgerError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// LedgerGateway impl
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerGateway for RpcLedger {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.rpc("ledger_blockNumber", json!([]))
            .await?
            .as_u64()
            .ok_or_else(|| LedgerError::Decode("block number is not an integer".to_string()))
    }

    async fn warehouse_counter(&self) -> Result<i64, LedgerError> {
        self.call("warehouseCounter", json!([]))
            .await?
            .as_i64()
            .ok_or_else(|| LedgerError::Decode("warehouse counter is not an integer".to_string()))
    }

    async fn lease_counter(&self) -> Result<i64, LedgerError> {
        self.call("leaseCounter", json!([]))
            .await?
            .as_i64()
            .ok_or_else(|| LedgerError::Decode("lease counter is not an integer".to_string()))
    }

    async fn get_warehouse(&self, ledger_id: i64) -> Result<Option<LedgerWarehouse>, LedgerError> {
        let v = self.call("getWarehouse", json!([ledger_id])).await?;
        let view: LedgerWarehouse = view_from_value(v)?;
        Ok(Some(view).filter(LedgerWarehouse::exists))
    }

    async fn get_lease(&self, ledger_id: i64) -> Result<Option<LedgerLease>, LedgerError> {
        let v = self.call("getLease", json!([ledger_id])).await?;
        let view: LedgerLease = view_from_value(v)?;
        Ok(Some(view).filter(LedgerLease::exists))
    }

    async fn register_warehouse(
        &self,
        reg: &WarehouseRegistration,
    ) -> Result<Registered, LedgerError> {
        let receipt = self
            .send(
                "registerWarehouse",
                json!([
                    reg.name,
                    reg.location,
                    reg.total_area,
                    reg.price_per_unit_per_day,
                    reg.image_url,
                    reg.description,
                ]),
                self.endpoint.gas.register_warehouse,
                None,
            )
            .await?;

        // The typed event carries the allocated id; the global counter is
        // the fallback for nodes that omit logs from receipts.
        let ledger_id = match receipt.events.iter().find_map(|ev| match ev {
            LedgerEvent::WarehouseRegistered { ledger_id } => Some(*ledger_id),
            _ => None,
        }) {
            Some(id) => id,
            None => {
                debug!(tx_ref = %receipt.tx_ref, "no WarehouseRegistered event; reading counter");
                self.warehouse_counter().await?
            }
        };

        Ok(Registered {
            ledger_id,
            tx_ref: receipt.tx_ref,
        })
    }

    async fn update_warehouse(
        &self,
        ledger_id: i64,
        update: &WarehouseUpdate,
    ) -> Result<Confirmation, LedgerError> {
        let receipt = self
            .send(
                "updateWarehouse",
                json!([
                    ledger_id,
                    update.name,
                    update.location,
                    update.price_per_unit_per_day,
                    update.image_url,
                    update.description,
                    update.is_active,
                ]),
                self.endpoint.gas.update_warehouse,
                None,
            )
            .await?;
        Ok(Confirmation {
            tx_ref: receipt.tx_ref,
        })
    }

    async fn create_lease(
        &self,
        warehouse_ledger_id: i64,
        area: i64,
        duration_days: i64,
        payment: i64,
    ) -> Result<Registered, LedgerError> {
        let receipt = self
            .send(
                "createLease",
                json!([warehouse_ledger_id, area, duration_days]),
                self.endpoint.gas.create_lease,
                Some(payment),
            )
            .await?;

        let ledger_id = match receipt.events.iter().find_map(|ev| match ev {
            LedgerEvent::LeaseCreated { ledger_id } => Some(*ledger_id),
            _ => None,
        }) {
            Some(id) => id,
            None => {
                debug!(tx_ref = %receipt.tx_ref, "no LeaseCreated event; reading counter");
                self.lease_counter().await?
            }
        };

        Ok(Registered {
            ledger_id,
            tx_ref: receipt.tx_ref,
        })
    }

    async fn complete_lease(&self, ledger_id: i64) -> Result<Confirmation, LedgerError> {
        let receipt = self
            .send(
                "completeLease",
                json!([ledger_id]),
                self.endpoint.gas.complete_lease,
                None,
            )
            .await?;
        Ok(Confirmation {
            tx_ref: receipt.tx_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_envelope_maps_to_rpc_error() {
        let payload = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "nonce too low" } });
        match parse_rpc_result(&payload) {
            Err(LedgerError::Rpc { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "nonce too low");
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[test]
    fn missing_result_is_a_decode_error() {
        let payload = json!({ "jsonrpc": "2.0", "id": 1 });
        assert!(matches!(
            parse_rpc_result(&payload),
            Err(LedgerError::Decode(_))
        ));
    }

    #[test]
    fn null_receipt_is_pending() {
        assert!(matches!(
            parse_receipt("0xabc", &Value::Null),
            Ok(ReceiptState::Pending)
        ));
    }

    #[test]
    fn confirmed_receipt_decodes_typed_events_and_skips_unknown() {
        let payload = json!({
            "status": "confirmed",
            "events": [
                { "name": "FeeSplit", "args": { "id": 1 } },
                { "name": "WarehouseRegistered", "args": { "id": 4 } },
            ],
        });
        match parse_receipt("0xabc", &payload) {
            Ok(ReceiptState::Confirmed(receipt)) => {
                assert_eq!(receipt.tx_ref, "0xabc");
                assert_eq!(
                    receipt.events,
                    vec![LedgerEvent::WarehouseRegistered { ledger_id: 4 }]
                );
            }
            _ => panic!("expected confirmed receipt"),
        }
    }

    #[test]
    fn reverted_receipt_carries_reason() {
        let payload = json!({ "status": "reverted", "reason": "Lease has not ended yet" });
        match parse_receipt("0xabc", &payload) {
            Ok(ReceiptState::Reverted { reason }) => {
                assert_eq!(reason, "Lease has not ended yet");
                assert!(whs_schemas::RevertKind::classify(&reason).is_retryable());
            }
            _ => panic!("expected reverted receipt"),
        }
    }

    #[test]
    fn endpoint_debug_redacts_signer_key() {
        let ep = LedgerEndpoint {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            program_address: "0xprog".to_string(),
            signer_address: "0xsigner".to_string(),
            signer_key: "super-secret".to_string(),
            confirm_timeout: Duration::from_secs(60),
            gas: GasLimits::default(),
        };
        let rendered = format!("{ep:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<REDACTED>"));
    }
}
