//! Append-only heal journal. Writes JSON Lines (one record per line).
//!
//! Every corrective action the reconciliation engine takes against the
//! relational store — orphan completion, stale-flag copy, bulk link reset,
//! registration link — is recorded here with before/after state, so no
//! heal is silently invisible. Optional hash chain: each record can carry
//! hash_prev + hash_self for tamper evidence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One journal record. `before`/`after` carry the relational state the
/// engine observed and the state it wrote, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealRecord {
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    /// e.g. "lease.orphan_healed", "warehouse.links_reset"
    pub action: String,
    /// Local id of the affected record ("lease:12", "warehouse:*").
    pub subject: String,
    pub before: Value,
    pub after: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only writer for the heal journal.
pub struct HealJournal {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl HealJournal {
    /// Creates the journal writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Restore chain state when resuming an existing journal after restart.
    pub fn resume(&mut self, seq: u64, last_hash: Option<String>) {
        self.seq = seq;
        self.last_hash = last_hash;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one record.
    pub fn append(
        &mut self,
        action: &str,
        subject: &str,
        before: Value,
        after: Value,
    ) -> Result<HealRecord> {
        let mut rec = HealRecord {
            seq: self.seq,
            ts_utc: Utc::now(),
            action: action.to_string(),
            subject: subject.to_string(),
            before,
            after,
            hash_prev: None,
            hash_self: None,
        };
        self.seq += 1;

        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            let self_hash = compute_record_hash(&rec)?;
            rec.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = serde_json::to_string(&rec).context("serialize heal record")?;
        append_line(&self.path, &line)?;
        Ok(rec)
    }
}

/// Hash over the record with hash_self cleared (it cannot hash itself).
fn compute_record_hash(rec: &HealRecord) -> Result<String> {
    let mut unhashed = rec.clone();
    unhashed.hash_self = None;
    let bytes = serde_json::to_vec(&unhashed).context("serialize record for hashing")?;
    let mut h = Sha256::new();
    h.update(&bytes);
    Ok(hex::encode(h.finalize()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open heal journal {:?}", path))?;
    writeln!(f, "{line}").with_context(|| format!("append to heal journal {:?}", path))?;
    Ok(())
}

/// Read a journal back (for tests and operator tooling).
pub fn read_journal(path: impl AsRef<Path>) -> Result<Vec<HealRecord>> {
    let raw = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read heal journal {:?}", path.as_ref()))?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).context("parse heal record"))
        .collect()
}
