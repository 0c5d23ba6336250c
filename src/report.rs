//! Human-readable report rendering for terminal output.
//!
//! Produces a colored summary with parse statistics and the two audit
//! sections. The export module owns file output; this is display only.
use colored::*;

use crate::engine::{AuditReport, Engine};
use crate::record::AuditResultSet;

fn visible_len(s: &str) -> usize {
    // Strip ANSI escape sequences (\x1b[ ... m) to compute printable width
    let mut len = 0;
    let mut iter = s.chars().peekable();
    while let Some(ch) = iter.next() {
        if ch == '\u{1b}' {
            if let Some('[') = iter.peek().cloned() {
                let _ = iter.next();
            }
            for c in iter.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

fn section_header(title: &str) -> String {
    let len = visible_len(title);
    let mut s = String::new();
    s.push('\n');
    s.push_str(title);
    s.push('\n');
    s.push_str(&"─".repeat(len));
    s.push_str("\n\n");
    s
}

pub fn render_summary(engine: &Engine, report: &AuditReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        "CredAudit: Credential Dump Audit Results".bold().cyan()
    ));

    out.push_str(&section_header(
        &"Parse Statistics".bold().yellow().to_string(),
    ));
    let stats = engine.parse_stats;
    out.push_str(&format!("Cleartext records: {}\n", engine.secrets.len()));
    out.push_str(&format!("Hash records: {}\n", engine.hashes.len()));
    out.push_str(&format!("Secrets noise lines: {}\n", stats.secrets_noise));
    out.push_str(&format!(
        "Secrets malformed lines: {}\n",
        stats.secrets_malformed
    ));
    out.push_str(&format!("SAM excluded lines: {}\n", stats.sam_excluded));
    out.push_str(&format!("SAM malformed lines: {}\n", stats.sam_malformed));

    out.push_str(&section_header(
        &"Service Account Cleartext Audit".bold().cyan().to_string(),
    ));
    if report.unverified.secrets.is_empty() {
        out.push_str("(No cleartext records)\n");
    } else {
        for r in &report.unverified.secrets {
            out.push_str(&format!("  {} {}: {}\n", r.host, r.account, r.secret));
        }
    }

    out.push_str(&section_header(
        &"Local Admin Reuse Audit".bold().cyan().to_string(),
    ));
    out.push_str(&render_reuse_section(&report.final_set));

    out
}

fn render_reuse_section(set: &AuditResultSet) -> String {
    let mut out = String::new();
    if set.verified {
        out.push_str(&format!("Verified findings: {}\n", set.reuse.len()));
    } else {
        out.push_str(&format!(
            "Unverified reuse candidates: {}\n",
            set.reuse.len()
        ));
    }
    for r in &set.reuse {
        out.push_str(&format!("  {} {} {}\n", r.host, r.account, r.nt_hash));
    }
    out
}
