//! Pure correlation over normalized records: exact-tuple dedup of cleartext
//! secrets, and cross-record reuse grouping of NT hashes. No I/O here.
use std::collections::{HashMap, HashSet};

use crate::record::{HashRecord, ReuseCandidate, SecretRecord};

/// Deduplicate secret records by full-tuple equality, preserving first
/// occurrence order.
pub fn dedup_secrets(records: Vec<SecretRecord>) -> Vec<SecretRecord> {
    let mut seen: HashSet<SecretRecord> = HashSet::with_capacity(records.len());
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        if seen.insert(r.clone()) {
            out.push(r);
        }
    }
    out
}

/// Return every hash record whose `(account, nt_hash)` key occurs with
/// multiplicity >= 2 across the full input — keep-all-duplicates grouping.
///
/// Host distinctness deliberately does not enter the key: two identical lines
/// from one host register as reuse, matching the dedup-by-subset semantics the
/// audit has always had. Output is sorted by `(nt_hash, account, host)` so
/// reports are deterministic and scannable.
pub fn reuse_candidates(records: &[HashRecord]) -> Vec<ReuseCandidate> {
    let mut counts: HashMap<(&str, &str), usize> = HashMap::with_capacity(records.len());
    for r in records {
        *counts.entry(r.reuse_key()).or_insert(0) += 1;
    }
    let mut out: Vec<ReuseCandidate> = records
        .iter()
        .filter(|r| counts[&r.reuse_key()] >= 2)
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        (a.nt_hash.as_str(), a.account.as_str(), a.host.as_str()).cmp(&(
            b.nt_hash.as_str(),
            b.account.as_str(),
            b.host.as_str(),
        ))
    });
    out
}
