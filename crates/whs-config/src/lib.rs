//! Configuration for the warehouse-sharing reconciliation service.
//!
//! # Contract
//! - Config YAML stores only env var **NAMES** for secret material (the
//!   signer key, the database URL). Never the values.
//! - Loading canonicalizes the effective config to JSON and hashes it so
//!   the running config can be reported and compared.
//! - A secret-literal guard refuses config files that carry key material
//!   inline.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Default env var holding the ledger signer's private key.
pub const ENV_SIGNER_KEY: &str = "WHS_SIGNER_KEY";

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with
/// CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM private keys
    "AKIA",       // AWS access key ID
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
];

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,
    /// Address of the deployed ledger program.
    pub program_address: String,
    /// Address the signer key corresponds to.
    pub signer_address: String,
    /// Env var NAME holding the signer private key (value never in config).
    #[serde(default = "default_signer_key_env")]
    pub signer_key_env: String,
    /// Upper bound on a write's confirmation wait.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default)]
    pub gas: GasConfig,
}

/// Bounded gas limits per call, sized to each call's complexity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GasConfig {
    #[serde(default = "default_gas_register")]
    pub register_warehouse: u64,
    #[serde(default = "default_gas_register")]
    pub update_warehouse: u64,
    #[serde(default = "default_gas_lease_create")]
    pub create_lease: u64,
    #[serde(default = "default_gas_lease_complete")]
    pub complete_lease: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Lease expiry sweep period.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// How many one-second probes to spend waiting for the ledger node
    /// at startup before giving up.
    #[serde(default = "default_startup_probe_attempts")]
    pub startup_probe_attempts: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Append-only journal of corrective writes the sweeps apply.
    #[serde(default = "default_heal_journal_path")]
    pub heal_journal_path: String,
}

fn default_signer_key_env() -> String {
    ENV_SIGNER_KEY.to_string()
}
fn default_confirm_timeout_secs() -> u64 {
    60
}
fn default_gas_register() -> u64 {
    1_000_000
}
fn default_gas_lease_create() -> u64 {
    800_000
}
fn default_gas_lease_complete() -> u64 {
    500_000
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_startup_probe_attempts() -> u32 {
    30
}
fn default_bind_addr() -> String {
    "127.0.0.1:8790".to_string()
}
fn default_heal_journal_path() -> String {
    "heal-journal.jsonl".to_string()
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            register_warehouse: default_gas_register(),
            update_warehouse: default_gas_register(),
            create_lease: default_gas_lease_create(),
            complete_lease: default_gas_lease_complete(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            startup_probe_attempts: default_startup_probe_attempts(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            heal_journal_path: default_heal_journal_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// The effective config plus its canonical form and hash.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub config_hash: String,
    pub canonical_json: String,
}

/// Load and validate a YAML config file.
pub fn load_yaml(path: &str) -> Result<LoadedConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    load_yaml_str(&raw)
}

pub fn load_yaml_str(raw: &str) -> Result<LoadedConfig> {
    let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
    let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;

    enforce_no_secret_literals(&v_json)?;

    let config: AppConfig =
        serde_json::from_value(v_json.clone()).context("config schema mismatch")?;

    let canonical_json = canonicalize_json(&v_json)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());

    Ok(LoadedConfig {
        config,
        config_hash,
        canonical_json,
    })
}

/// Resolve the signer private key from the env var named in config.
/// Error messages reference the env var NAME, never the value.
pub fn resolve_signer_key(cfg: &LedgerConfig) -> Result<String> {
    let key = std::env::var(&cfg.signer_key_env)
        .with_context(|| format!("missing env var {}", cfg.signer_key_env))?;
    if key.trim().is_empty() {
        bail!("env var {} is set but empty", cfg.signer_key_env);
    }
    Ok(key)
}

/// Reject config trees whose string leaves carry key material.
fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut offenders: Vec<String> = Vec::new();
    scan_secret_leaves(v, "", &mut offenders);
    if !offenders.is_empty() {
        bail!(
            "CONFIG_SECRET_DETECTED: {} config value(s) look like secret material \
             (store env var names instead): {:?}",
            offenders.len(),
            offenders
        );
    }
    Ok(())
}

fn scan_secret_leaves(v: &Value, pointer: &str, offenders: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                scan_secret_leaves(vv, &format!("{pointer}/{k}"), offenders);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                scan_secret_leaves(vv, &format!("{pointer}/{i}"), offenders);
            }
        }
        Value::String(s) => {
            if looks_like_secret(s) {
                offenders.push(pointer.to_string());
            }
        }
        _ => {}
    }
}

fn looks_like_secret(s: &str) -> bool {
    if SECRET_PREFIXES.iter().any(|p| s.starts_with(p)) {
        return true;
    }
    // Raw 32-byte hex private keys (with or without 0x prefix).
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Canonical JSON: keys sorted, no insignificant whitespace. serde_json
/// objects preserve insertion order, so rebuild maps through BTreeMap.
fn canonicalize_json(v: &Value) -> Result<String> {
    fn sort(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<_, _> =
                    map.iter().map(|(k, vv)| (k.clone(), sort(vv))).collect();
                serde_json::to_value(sorted).unwrap_or(Value::Null)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(v)).context("canonical json serialization failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
ledger:
  rpc_url: "http://127.0.0.1:8545"
  program_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
  signer_address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
"#;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let loaded = load_yaml_str(MINIMAL).unwrap();
        let cfg = loaded.config;
        assert_eq!(cfg.ledger.confirm_timeout_secs, 60);
        assert_eq!(cfg.ledger.gas.register_warehouse, 1_000_000);
        assert_eq!(cfg.ledger.gas.complete_lease, 500_000);
        assert_eq!(cfg.scheduler.sweep_interval_secs, 30);
        assert_eq!(cfg.ledger.signer_key_env, ENV_SIGNER_KEY);
    }

    #[test]
    fn config_hash_is_stable_across_key_order() {
        let a = load_yaml_str(MINIMAL).unwrap();
        let reordered = r#"
ledger:
  signer_address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
  program_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
  rpc_url: "http://127.0.0.1:8545"
"#;
        let b = load_yaml_str(reordered).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn inline_private_key_is_refused() {
        let bad = r#"
ledger:
  rpc_url: "http://127.0.0.1:8545"
  program_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
  signer_address: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
"#;
        let err = load_yaml_str(bad).unwrap_err();
        assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad = format!("{MINIMAL}\nrisk:\n  max_exposure: 1\n");
        assert!(load_yaml_str(&bad).is_err());
    }
}
