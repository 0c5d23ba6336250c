//! Engine: orchestrates dump ingestion, correlation, and assembly of the
//! final result sets. Verification is driven by the caller (it needs a
//! confirmation gate and a live tool) and its output is handed back in via
//! [`Engine::assemble`].
//!
//! Typical usage:
//!
//! ```no_run
//! use credaudit::engine::Engine;
//! use credaudit::dump::DumpKind;
//! use credaudit::io::discover_dumps;
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = Engine::new();
//! let secrets = discover_dumps(std::path::Path::new("."), DumpKind::Secrets)?;
//! let sams = discover_dumps(std::path::Path::new("."), DumpKind::Sam)?;
//! engine.load_from_dump_files(&secrets, &sams)?;
//! let report = engine.assemble(None, false);
//! println!("{} reuse candidates", report.unverified.reuse.len());
//! # Ok(())
//! # }
//! ```
use anyhow::Result;
use log::debug;

use crate::correlate::{dedup_secrets, reuse_candidates};
use crate::dump::{LineSkip, parse_sam_line, parse_secret_line};
use crate::io::{DEFAULT_MMAP_THRESHOLD_BYTES, DumpFile, dump_lines};
use crate::record::{
    AuditResultSet, HashRecord, ReuseCandidate, SecretRecord, VerifiedFinding, sanitize_ascii,
};

/// Counters for lines that produced no record, split by why.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub secrets_noise: usize,
    pub secrets_malformed: usize,
    pub sam_excluded: usize,
    pub sam_malformed: usize,
}

/// The three result-set variants of one audit run.
#[derive(Debug, Clone)]
pub struct AuditReport {
    /// Raw correlation output, before any live verification.
    pub unverified: AuditResultSet,
    /// Verified findings when verification ran, otherwise the unverified set.
    pub final_set: AuditResultSet,
    /// Credential-free copy of `final_set`, only when confirmed.
    pub sanitized: Option<AuditResultSet>,
}

/// Aggregates normalized records and exposes loaders and the assembler.
#[derive(Debug, Default)]
pub struct Engine {
    pub secrets: Vec<SecretRecord>,
    pub hashes: Vec<HashRecord>,
    pub parse_stats: ParseStats,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load inputs already in memory as `(host, contents)` pairs. Intended
    /// for tests and small programmatic integrations.
    pub fn load_from_strings(&mut self, secrets: &[(&str, &str)], sams: &[(&str, &str)]) {
        for (host, contents) in secrets {
            for line in contents.lines() {
                self.ingest_secret_line(host, line);
            }
        }
        for (host, contents) in sams {
            for line in contents.lines() {
                self.ingest_sam_line(host, line);
            }
        }
    }

    /// Streamingly load discovered dump files with the default mmap
    /// threshold.
    pub fn load_from_dump_files(&mut self, secrets: &[DumpFile], sams: &[DumpFile]) -> Result<()> {
        self.load_from_dump_files_with_threshold(secrets, sams, DEFAULT_MMAP_THRESHOLD_BYTES)
    }

    pub fn load_from_dump_files_with_threshold(
        &mut self,
        secrets: &[DumpFile],
        sams: &[DumpFile],
        mmap_threshold_bytes: u64,
    ) -> Result<()> {
        for file in secrets {
            let iter = dump_lines(&file.path, mmap_threshold_bytes)?;
            for line in iter.flatten() {
                self.ingest_secret_line(&file.host, &line);
            }
        }
        for file in sams {
            let iter = dump_lines(&file.path, mmap_threshold_bytes)?;
            for line in iter.flatten() {
                self.ingest_sam_line(&file.host, &line);
            }
        }
        Ok(())
    }

    fn ingest_secret_line(&mut self, host: &str, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_secret_line(host, line) {
            Ok(r) => self.secrets.push(r),
            Err(LineSkip::Noise) => self.parse_stats.secrets_noise += 1,
            Err(reason) => {
                debug!("skipping secrets line from {host}: {reason}");
                self.parse_stats.secrets_malformed += 1;
            }
        }
    }

    fn ingest_sam_line(&mut self, host: &str, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_sam_line(host, line) {
            Ok(r) => self.hashes.push(r),
            Err(LineSkip::ExcludedAccount | LineSkip::NullHash) => {
                self.parse_stats.sam_excluded += 1;
            }
            Err(reason) => {
                debug!("skipping sam line from {host}: {reason}");
                self.parse_stats.sam_malformed += 1;
            }
        }
    }

    /// Deduplicated cleartext records, insertion order preserved.
    pub fn distinct_secrets(&self) -> Vec<SecretRecord> {
        dedup_secrets(self.secrets.clone())
    }

    /// Reuse candidates over every loaded hash record.
    pub fn reuse_candidates(&self) -> Vec<ReuseCandidate> {
        reuse_candidates(&self.hashes)
    }

    /// Merge correlation output with the verification result (when it ran)
    /// into the final result-set variants. Every field is passed through the
    /// ASCII sanitizer before any variant is finalized; the sanitized variant
    /// is only produced when `sanitize` is set.
    pub fn assemble(&self, verified: Option<Vec<VerifiedFinding>>, sanitize: bool) -> AuditReport {
        let secrets = sanitize_secret_fields(self.distinct_secrets());
        let candidates = sanitize_hash_fields(self.reuse_candidates());

        let unverified = AuditResultSet {
            secrets: secrets.clone(),
            reuse: candidates.clone(),
            verified: false,
            sanitized: false,
        };

        let final_set = match verified {
            Some(findings) => {
                let mut reuse: Vec<ReuseCandidate> = findings
                    .into_iter()
                    .map(|f| HashRecord {
                        host: sanitize_ascii(&f.host),
                        account: sanitize_ascii(&f.account),
                        nt_hash: sanitize_ascii(&f.nt_hash),
                    })
                    .collect();
                reuse.sort_by(|a, b| {
                    (&a.nt_hash, &a.account, &a.host).cmp(&(&b.nt_hash, &b.account, &b.host))
                });
                AuditResultSet {
                    secrets,
                    reuse,
                    verified: true,
                    sanitized: false,
                }
            }
            None => unverified.clone(),
        };

        let sanitized = sanitize.then(|| AuditResultSet {
            sanitized: true,
            ..final_set.clone()
        });

        AuditReport {
            unverified,
            final_set,
            sanitized,
        }
    }
}

fn sanitize_secret_fields(records: Vec<SecretRecord>) -> Vec<SecretRecord> {
    records
        .into_iter()
        .map(|r| SecretRecord {
            host: sanitize_ascii(&r.host),
            account: sanitize_ascii(&r.account),
            secret: sanitize_ascii(&r.secret),
        })
        .collect()
}

fn sanitize_hash_fields(records: Vec<HashRecord>) -> Vec<HashRecord> {
    records
        .into_iter()
        .map(|r| HashRecord {
            host: sanitize_ascii(&r.host),
            account: sanitize_ascii(&r.account),
            nt_hash: sanitize_ascii(&r.nt_hash),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAM_REUSED: &str =
        "jsmith:1001:aad3b435b51404eeaad3b435b51404ee:8846f7eaee8fb117ad06bdd830b7586c:::";

    #[test]
    fn loads_and_correlates_cross_host_reuse() {
        let mut e = Engine::new();
        e.load_from_strings(
            &[("dc01", "svc_backup:Hunter2!\nVersion: 1\n")],
            &[("ws01", SAM_REUSED), ("ws02", SAM_REUSED)],
        );
        assert_eq!(e.secrets.len(), 1);
        assert_eq!(e.parse_stats.secrets_noise, 1);
        let reuse = e.reuse_candidates();
        assert_eq!(reuse.len(), 2);
        assert_eq!(reuse[0].host, "ws01");
        assert_eq!(reuse[1].host, "ws02");
    }

    #[test]
    fn counts_excluded_and_malformed_sam_lines() {
        let mut e = Engine::new();
        let sam = "Guest:501:aad3b435b51404eeaad3b435b51404ee:8846f7eaee8fb117ad06bdd830b7586c:::\n\
                   garbage line\n\
                   Administrator:500:aad3b435b51404eeaad3b435b51404ee:31d6cfe0d16ae931b73c59d7e0c089c0:::\n";
        e.load_from_strings(&[], &[("ws01", sam)]);
        assert!(e.hashes.is_empty());
        assert_eq!(e.parse_stats.sam_excluded, 2);
        assert_eq!(e.parse_stats.sam_malformed, 1);
    }

    #[test]
    fn assemble_without_verification_mirrors_unverified() {
        let mut e = Engine::new();
        e.load_from_strings(
            &[("dc01", "svc:pw\nsvc:pw\n")],
            &[("ws01", SAM_REUSED), ("ws02", SAM_REUSED)],
        );
        let report = e.assemble(None, false);
        assert_eq!(report.unverified.secrets.len(), 1);
        assert_eq!(report.unverified.reuse.len(), 2);
        assert!(!report.final_set.verified);
        assert_eq!(report.final_set.reuse, report.unverified.reuse);
        assert!(report.sanitized.is_none());
    }

    #[test]
    fn assemble_with_verification_keeps_confirmed_subset() {
        let mut e = Engine::new();
        e.load_from_strings(&[], &[("ws01", SAM_REUSED), ("ws02", SAM_REUSED)]);
        let finding = VerifiedFinding {
            host: "ws02".to_string(),
            account: "jsmith".to_string(),
            nt_hash: "8846f7eaee8fb117ad06bdd830b7586c".to_string(),
        };
        let report = e.assemble(Some(vec![finding]), true);
        assert_eq!(report.unverified.reuse.len(), 2);
        assert!(report.final_set.verified);
        assert_eq!(report.final_set.reuse.len(), 1);
        assert_eq!(report.final_set.reuse[0].host, "ws02");

        let sanitized = report.sanitized.unwrap();
        assert!(sanitized.sanitized);
        assert_eq!(sanitized.reuse.len(), 1);
    }

    #[test]
    fn assemble_is_idempotent_on_ascii_input() {
        let mut e = Engine::new();
        e.load_from_strings(&[("dc01", "svc:pw\n")], &[]);
        let a = e.assemble(None, false);
        let b = e.assemble(None, false);
        assert_eq!(a.unverified.secrets, b.unverified.secrets);
        assert_eq!(a.unverified.reuse, b.unverified.reuse);
    }
}
