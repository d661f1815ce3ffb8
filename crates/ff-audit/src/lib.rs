//! ff-audit
//!
//! Append-only compliance journal. Writes JSON Lines (one entry per line)
//! recording every order transition, regulatory filing, and webhook decision.
//! Optional hash chain: each entry can include hash_prev + hash_self so an
//! auditor can prove the trail was never edited after the fact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Append-only journal writer.
pub struct AuditJournal {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Monotonic sequence counter feeding the deterministic entry-id
    /// derivation. When resuming an existing journal after a restart,
    /// restore with `set_seq(entries_already_written)` alongside
    /// `set_last_hash`.
    seq: u64,
}

impl AuditJournal {
    /// Creates the journal writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {parent:?}"))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Set last hash explicitly (e.g. after reading the last line on restart).
    pub fn set_last_hash(&mut self, last_hash: Option<String>) {
        self.last_hash = last_hash;
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Restore the sequence counter when resuming an existing journal.
    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one entry.
    ///
    /// `subject` names what the entry concerns ("order:<uuid>",
    /// "submission:<uuid>"); `event_type` is the decision
    /// ("status_transition", "webhook_conflict", ...).
    pub fn append(&mut self, subject: &str, event_type: &str, payload: Value) -> Result<AuditEntry> {
        let ts_utc = Utc::now();
        // Entry id derived deterministically from chain state + payload + seq.
        // No RNG, so replaying the same journal converges to the same ids.
        let entry_id = derive_entry_id(self.last_hash.as_deref(), &payload, self.seq)?;
        self.seq += 1;

        let mut entry = AuditEntry {
            entry_id,
            ts_utc,
            subject: subject.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            entry.hash_prev = self.last_hash.clone();
            let self_hash = compute_entry_hash(&entry)?;
            entry.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&entry)?;
        append_line(&self.path, &line)?;

        Ok(entry)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub subject: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Namespace for deterministic entry-id derivation (UUIDv5).
const ENTRY_ID_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

fn derive_entry_id(last_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let canonical_payload = canonical_json_line(payload)?;
    let material = format!("{}|{seq}|{canonical_payload}", last_hash.unwrap_or("genesis"));
    Ok(Uuid::new_v5(&ENTRY_ID_NAMESPACE, material.as_bytes()))
}

/// Write a single line to file (with trailing newline).
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit journal {path:?}"))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
/// One entry == one JSON line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Chain hash is computed from canonical JSON of the entry WITHOUT hash_self
/// (to avoid self-reference).
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the hash-chain integrity of a journal file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit journal {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] but over in-memory JSONL content.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: AuditEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit entry at line {}", i + 1))?;

        line_count += 1;

        if entry.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(&entry)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

/// Result of hash-chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appended_entries_form_a_valid_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let mut journal = AuditJournal::new(&path, true).unwrap();

        journal
            .append("order:o-1", "status_transition", json!({"from": "pending", "to": "payment_pending"}))
            .unwrap();
        journal
            .append("order:o-1", "status_transition", json!({"from": "payment_pending", "to": "payment_registered"}))
            .unwrap();
        journal
            .append("submission:s-1", "webhook_applied", json!({"event": "approved"}))
            .unwrap();

        match verify_hash_chain(&path).unwrap() {
            VerifyResult::Valid { lines } => assert_eq!(lines, 3),
            VerifyResult::Broken { line, reason } => {
                panic!("chain broken at line {line}: {reason}")
            }
        }
    }

    #[test]
    fn tampering_with_a_line_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let mut journal = AuditJournal::new(&path, true).unwrap();
        journal.append("order:o-1", "status_transition", json!({"to": "active"})).unwrap();
        journal.append("order:o-1", "sla_stamped", json!({})).unwrap();

        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("active", "cancelled");
        match verify_hash_chain_str(&tampered).unwrap() {
            VerifyResult::Broken { line, .. } => assert_eq!(line, 1),
            VerifyResult::Valid { .. } => panic!("tampered journal must not verify"),
        }
    }

    #[test]
    fn entry_ids_are_deterministic_for_identical_chain_state() {
        let payload = json!({"to": "active"});
        let a = derive_entry_id(None, &payload, 0).unwrap();
        let b = derive_entry_id(None, &payload, 0).unwrap();
        assert_eq!(a, b);
        let c = derive_entry_id(None, &payload, 1).unwrap();
        assert_ne!(a, c, "sequence must feed the derivation");
    }

    #[test]
    fn without_hash_chain_entries_have_no_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let mut journal = AuditJournal::new(&path, false).unwrap();
        let entry = journal.append("order:o-1", "noop", json!({})).unwrap();
        assert!(entry.hash_prev.is_none());
        assert!(entry.hash_self.is_none());
    }
}
