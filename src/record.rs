//! Typed credential records produced by dump normalization and consumed by
//! the correlation and verification stages.
//!
//! Records are value-like: built once during parsing, sanitized at creation,
//! and owned by whichever pipeline stage currently holds them. Equality and
//! hashing are full-tuple, which is what the dedup pass relies on.
use serde::Serialize;

/// Well-known NT hash of the empty password. Hash records carrying it are
/// rejected at creation time.
pub const NULL_HASH_NT: &str = "31d6cfe0d16ae931b73c59d7e0c089c0";

/// Secrets longer than this are treated as misclassified blobs, not
/// credentials (base64 key material frequently trips the secrets parser).
pub const MAX_SECRET_LEN: usize = 50;

/// Strip non-ASCII bytes from a string. Dump exports routinely carry encoding
/// corruption; every record field passes through this before use. Idempotent.
pub fn sanitize_ascii(s: &str) -> String {
    s.chars().filter(char::is_ascii).collect()
}

/// One cleartext credential extracted from a service-account secrets dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SecretRecord {
    pub host: String,
    pub account: String,
    pub secret: String,
}

impl SecretRecord {
    /// Build a record, case-folding the account and sanitizing every field.
    /// Secret casing is preserved. Returns `None` when the secret exceeds
    /// [`MAX_SECRET_LEN`].
    pub fn new(host: &str, account: &str, secret: &str) -> Option<Self> {
        let secret = sanitize_ascii(secret.trim());
        if secret.len() > MAX_SECRET_LEN {
            return None;
        }
        Some(Self {
            host: sanitize_ascii(host.trim()).to_lowercase(),
            account: sanitize_ascii(account.trim()).to_lowercase(),
            secret,
        })
    }
}

/// One local-account NT hash extracted from a SAM-style dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HashRecord {
    pub host: String,
    pub account: String,
    pub nt_hash: String,
}

impl HashRecord {
    /// Build a record, case-folding account and hash. Returns `None` for the
    /// empty-password hash or a value that is not 32 hex chars.
    pub fn new(host: &str, account: &str, nt_hash: &str) -> Option<Self> {
        let nt_hash = sanitize_ascii(nt_hash.trim()).to_lowercase();
        if nt_hash == NULL_HASH_NT || !is_nt_hash(&nt_hash) {
            return None;
        }
        Some(Self {
            host: sanitize_ascii(host.trim()).to_lowercase(),
            account: sanitize_ascii(account.trim()).to_lowercase(),
            nt_hash,
        })
    }

    /// Grouping key for reuse detection: host is deliberately excluded.
    pub fn reuse_key(&self) -> (&str, &str) {
        (self.account.as_str(), self.nt_hash.as_str())
    }
}

/// A [`HashRecord`] whose `(account, nt_hash)` pair occurs with multiplicity
/// >= 2 across the ingested record set.
pub type ReuseCandidate = HashRecord;

/// A reuse candidate confirmed by a successful live authentication attempt
/// against its host. Only the verification stage creates these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VerifiedFinding {
    pub host: String,
    pub account: String,
    pub nt_hash: String,
}

impl From<&ReuseCandidate> for VerifiedFinding {
    fn from(c: &ReuseCandidate) -> Self {
        Self {
            host: c.host.clone(),
            account: c.account.clone(),
            nt_hash: c.nt_hash.clone(),
        }
    }
}

fn is_nt_hash(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Terminal artifact of one audit run, handed to the report/export layer.
/// Three variants are produced per run: unverified, final, and (optionally)
/// sanitized for sharing.
#[derive(Debug, Clone)]
pub struct AuditResultSet {
    pub secrets: Vec<SecretRecord>,
    pub reuse: Vec<ReuseCandidate>,
    /// True when `reuse` holds live-verified findings rather than raw
    /// correlation candidates.
    pub verified: bool,
    /// True when the renderer must drop the secret/hash columns.
    pub sanitized: bool,
}
