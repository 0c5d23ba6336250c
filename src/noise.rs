//! Noise denylists for dump-line filtering, kept as named predicate lists so
//! each entry is unit-testable on its own and the order of evaluation is
//! explicit.
use std::sync::LazyLock;

use regex::Regex;

/// Marker for service-control-manager secret lines in secrets dumps.
pub const SCM_MARKER: &str = "SCM:{";

/// Substrings identifying key-blob, algorithm, and metadata lines in a
/// secrets dump. A line containing any of these is not a credential.
pub const SECRETS_DENYLIST: &[&str] = &[
    "aes256",
    "aes128",
    "plain_password",
    "des-cbc",
    "dpapi",
    "NL$KM",
    "L$ASP.NET",
    "L$_RasConn",
    "aad3b435b51404eeaad3b435b51404ee",
    "Security",
    "RasDial",
    "| ",
    "Version",
];

/// Built-in / test account names excluded from SAM hash records.
static BUILTIN_ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(default|guest|wdagutility)").unwrap());

/// Managed-service-account naming pattern (gMSA and machine accounts carry a
/// trailing `$`).
static MSA_ACCOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$$").unwrap());

/// True when a secrets-dump line is known noise rather than a credential.
pub fn is_secrets_noise(line: &str) -> bool {
    if line.contains(SCM_MARKER) {
        return true;
    }
    SECRETS_DENYLIST.iter().any(|kw| line.contains(kw))
}

/// True when a SAM account name belongs to a built-in, test, or managed
/// service account and must be excluded.
pub fn is_excluded_account(account: &str) -> bool {
    BUILTIN_ACCOUNT.is_match(account) || MSA_ACCOUNT.is_match(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scm_lines_are_noise() {
        assert!(is_secrets_noise("dpapi_machinekey:SCM:{guid}"));
    }

    #[test]
    fn every_denylist_entry_fires() {
        for kw in SECRETS_DENYLIST {
            let line = format!("prefix {kw} suffix");
            assert!(is_secrets_noise(&line), "denylist entry did not fire: {kw}");
        }
    }

    #[test]
    fn credential_line_is_not_noise() {
        assert!(!is_secrets_noise("corp\\svc_sql:Summer2024!"));
    }

    #[test]
    fn builtin_and_msa_accounts_excluded() {
        assert!(is_excluded_account("guest"));
        assert!(is_excluded_account("Guest"));
        assert!(is_excluded_account("defaultaccount"));
        assert!(is_excluded_account("wdagutilityaccount"));
        assert!(is_excluded_account("gmsa_web01$"));
        assert!(!is_excluded_account("administrator"));
        assert!(!is_excluded_account("jsmith"));
    }
}
