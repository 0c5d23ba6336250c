//! Line-level normalization of secretsdump output into typed records.
//!
//! Two dump kinds are handled: `.secretsdump.secrets` files carrying cleartext
//! service-account material, and `.secretsdump.sam` files carrying local
//! account NT hashes. Host identity comes from the file name, derived once per
//! file, never per line.
//!
//! Skips are signalled with [`LineSkip`] so callers can keep per-reason
//! counters; a skip never aborts the surrounding run.
use std::path::Path;

use crate::noise::{is_excluded_account, is_secrets_noise};
use crate::record::{HashRecord, NULL_HASH_NT, SecretRecord};

/// The two dump flavors an audit run ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Secrets,
    Sam,
}

impl DumpKind {
    /// Fixed dump-tool filename suffix for this kind.
    pub fn suffix(self) -> &'static str {
        match self {
            DumpKind::Secrets => ".secretsdump.secrets",
            DumpKind::Sam => ".secretsdump.sam",
        }
    }

    /// Derive the host identity from a dump file name by stripping the kind
    /// suffix and case-folding. `None` when the name does not carry the
    /// suffix.
    pub fn host_for(self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(self.suffix())?;
        if stem.is_empty() {
            return None;
        }
        Some(stem.to_lowercase())
    }
}

/// Reason a line produced no record. `Noise` and `Excluded*` are expected on
/// every real dump; the rest indicate malformed input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineSkip {
    #[error("noise line")]
    Noise,
    #[error("no account/secret delimiter")]
    NoDelimiter,
    #[error("secret exceeds length cap")]
    OverlongSecret,
    #[error("expected >=4 colon fields, got {0}")]
    FieldCount(usize),
    #[error("built-in or managed-service account")]
    ExcludedAccount,
    #[error("empty-password hash")]
    NullHash,
    #[error("hash is not 32 hex chars")]
    BadHash,
}

/// Parse one line of a secrets dump into a [`SecretRecord`].
pub fn parse_secret_line(host: &str, line: &str) -> Result<SecretRecord, LineSkip> {
    if is_secrets_noise(line) {
        return Err(LineSkip::Noise);
    }
    let (account, secret) = line.split_once(':').ok_or(LineSkip::NoDelimiter)?;
    SecretRecord::new(host, account, secret).ok_or(LineSkip::OverlongSecret)
}

/// Parse one line of a SAM dump into a [`HashRecord`]. Field layout follows
/// secretsdump: `account:rid:lm_hash:nt_hash:::`.
pub fn parse_sam_line(host: &str, line: &str) -> Result<HashRecord, LineSkip> {
    let parts: Vec<&str> = line.trim().split(':').collect();
    if parts.len() < 4 {
        return Err(LineSkip::FieldCount(parts.len()));
    }
    let account = parts[0].trim().to_lowercase();
    if is_excluded_account(&account) {
        return Err(LineSkip::ExcludedAccount);
    }
    let nt_hash = parts[3].trim();
    if nt_hash.eq_ignore_ascii_case(NULL_HASH_NT) {
        return Err(LineSkip::NullHash);
    }
    HashRecord::new(host, &account, nt_hash).ok_or(LineSkip::BadHash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_derivation_strips_suffix_and_folds() {
        let p = Path::new("DC01.secretsdump.secrets");
        assert_eq!(DumpKind::Secrets.host_for(p), Some("dc01".to_string()));
        let p = Path::new("/tmp/dumps/FS02.secretsdump.sam");
        assert_eq!(DumpKind::Sam.host_for(p), Some("fs02".to_string()));
        assert_eq!(DumpKind::Sam.host_for(Path::new("notes.txt")), None);
        assert_eq!(
            DumpKind::Secrets.host_for(Path::new(".secretsdump.secrets")),
            None
        );
    }

    #[test]
    fn secret_line_preserves_secret_case() {
        let r = parse_secret_line("dc01", "WORKSTATION01\\svc_backup:P@ssw0rd123").unwrap();
        assert_eq!(r.host, "dc01");
        assert_eq!(r.account, "workstation01\\svc_backup");
        assert_eq!(r.secret, "P@ssw0rd123");
    }

    #[test]
    fn secret_noise_lines_yield_nothing() {
        for line in [
            "dpapi_machinekey:0xdeadbeef",
            "svc:SCM:{guid}",
            "corp\\krbtgt:aes256-cts-hmac-sha1-96:abcd",
            "NL$KM:0011223344",
            "Version: 1",
        ] {
            assert_eq!(parse_secret_line("h", line), Err(LineSkip::Noise), "{line}");
        }
    }

    #[test]
    fn secret_line_without_colon_is_skipped() {
        assert_eq!(
            parse_secret_line("h", "not a data line"),
            Err(LineSkip::NoDelimiter)
        );
    }

    #[test]
    fn sam_line_parses_account_and_nt_hash() {
        let line = "jsmith:1001:aad3b435b51404eeaad3b435b51404ee:8846f7eaee8fb117ad06bdd830b7586c:::";
        let r = parse_sam_line("ws07", line).unwrap();
        assert_eq!(r.account, "jsmith");
        assert_eq!(r.nt_hash, "8846f7eaee8fb117ad06bdd830b7586c");
    }

    #[test]
    fn sam_null_hash_line_is_excluded() {
        let line = "Administrator:500:aad3b435b51404eeaad3b435b51404ee:31d6cfe0d16ae931b73c59d7e0c089c0:::";
        assert_eq!(parse_sam_line("h", line), Err(LineSkip::NullHash));
    }

    #[test]
    fn sam_builtin_accounts_are_excluded() {
        let line = "Guest:501:aad3b435b51404eeaad3b435b51404ee:8846f7eaee8fb117ad06bdd830b7586c:::";
        assert_eq!(parse_sam_line("h", line), Err(LineSkip::ExcludedAccount));
    }

    #[test]
    fn sam_short_line_is_skipped() {
        assert_eq!(parse_sam_line("h", "a:b"), Err(LineSkip::FieldCount(2)));
    }
}
