//! Export helpers for writing audit result sets to CSV files.
//!
//! Each result-set variant becomes two files, one per audit section. The
//! sanitized variant keeps only the host/account identity columns so the
//! files can be shared without exposing credential material.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;

use crate::engine::AuditReport;
use crate::record::AuditResultSet;

const SECRETS_SECTION: &str = "service_account_cleartext";
const REUSE_SECTION: &str = "local_admin_reuse";

/// Write one variant's two sections into `dir`, returning the created paths.
pub fn save_result_set_csv(
    set: &AuditResultSet,
    dir: &Path,
    label: &str,
    timestamp: &str,
) -> Result<Vec<PathBuf>> {
    let secrets_path = dir.join(format!("credaudit_{SECRETS_SECTION}_{label}_{timestamp}.csv"));
    let reuse_path = dir.join(format!("credaudit_{REUSE_SECTION}_{label}_{timestamp}.csv"));

    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(&secrets_path)
        .with_context(|| format!("create {}", secrets_path.display()))?;
    if set.sanitized {
        wtr.write_record(["HOST", "ACCOUNT"])?;
        for r in &set.secrets {
            wtr.write_record([r.host.as_str(), r.account.as_str()])?;
        }
    } else {
        wtr.write_record(["HOST", "ACCOUNT", "PASSWORD"])?;
        for r in &set.secrets {
            wtr.serialize(r)?;
        }
    }
    wtr.flush()
        .with_context(|| format!("write {}", secrets_path.display()))?;

    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(&reuse_path)
        .with_context(|| format!("create {}", reuse_path.display()))?;
    if set.sanitized {
        wtr.write_record(["HOST", "ACCOUNT"])?;
        for r in &set.reuse {
            wtr.write_record([r.host.as_str(), r.account.as_str()])?;
        }
    } else {
        wtr.write_record(["HOST", "ACCOUNT", "NT HASH"])?;
        for r in &set.reuse {
            wtr.serialize(r)?;
        }
    }
    wtr.flush()
        .with_context(|| format!("write {}", reuse_path.display()))?;

    Ok(vec![secrets_path, reuse_path])
}

/// Write every variant of a report into `dir` with a shared timestamp.
pub fn save_report_csv(report: &AuditReport, dir: &Path) -> Result<Vec<PathBuf>> {
    let ts = chrono::Local::now().format("%Y.%m.%d_%H.%M.%S").to_string();
    let mut written = save_result_set_csv(&report.unverified, dir, "unverified", &ts)?;
    if report.final_set.verified {
        written.extend(save_result_set_csv(&report.final_set, dir, "verified", &ts)?);
    }
    if let Some(sanitized) = &report.sanitized {
        written.extend(save_result_set_csv(sanitized, dir, "sanitized", &ts)?);
    }
    Ok(written)
}
