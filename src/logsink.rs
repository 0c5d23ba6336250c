//! Append-only diagnostic log shared by concurrent verification workers.
//!
//! Workers record one entry per authentication attempt (command context plus
//! captured output) and per error or timeout. Each append is a single write
//! under the lock so concurrent entries never interleave.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::warn;

/// Thread-safe append sink for verification diagnostics.
pub trait LogSink: Send + Sync {
    /// Append one entry. Implementations timestamp and terminate the line;
    /// callers pass the bare message.
    fn append(&self, entry: &str);
}

/// File-backed sink, opened in append mode. Write failures are downgraded to
/// a `log` warning so a full disk cannot take down a verification run.
pub struct FileLog {
    file: Mutex<File>,
}

impl FileLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLog {
    fn append(&self, entry: &str) {
        let stamped = format!("[{}] {entry}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(stamped.as_bytes()) {
            warn!("diagnostic log write failed: {e}");
        }
    }
}

/// In-memory sink for tests and library embedding.
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        match self.entries.lock() {
            Ok(v) => v.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for MemoryLog {
    fn append(&self, entry: &str) {
        let mut entries = match self.entries.lock() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(entry.to_string());
    }
}
