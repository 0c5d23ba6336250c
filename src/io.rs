//! Dump-file discovery and line iteration.
//!
//! Discovery walks a single directory, matching files on the fixed dump-tool
//! suffixes and skipping anything unreadable. Line iteration uses a buffered
//! reader for small files and switches to mmap above a size threshold, which
//! matters when engagements produce multi-gigabyte secrets dumps.
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use memmap2::Mmap;

use crate::dump::DumpKind;

/// Threshold in bytes above which line iteration switches to mmap.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

pub type LineIter = Box<dyn Iterator<Item = io::Result<String>> + Send + 'static>;

/// One discovered dump file with its derived host identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    pub path: PathBuf,
    pub host: String,
    pub kind: DumpKind,
}

/// Scan `dir` for dump files of the given kind. Non-files and files that
/// cannot be opened are skipped with a warning; a partially readable
/// directory never aborts the run.
pub fn discover_dumps(dir: &Path, kind: DumpKind) -> Result<Vec<DumpFile>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable directory entry in {}: {e}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        let Some(host) = kind.host_for(&path) else {
            continue;
        };
        if !path.is_file() {
            continue;
        }
        if let Err(e) = File::open(&path) {
            warn!("skipping unreadable dump file {}: {e}", path.display());
            continue;
        }
        out.push(DumpFile { path, host, kind });
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

/// Iterate lines of a dump file, choosing buffered or mmap reading by file
/// size against `threshold_bytes`.
pub fn dump_lines(path: &Path, threshold_bytes: u64) -> Result<LineIter> {
    let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.is_file() && meta.len() >= threshold_bytes {
        mmap_lines(path)
    } else {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Box::new(BufReader::new(file).lines()))
    }
}

fn mmap_lines(path: &Path) -> Result<LineIter> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.display()))?;
    Ok(Box::new(MmapLines { mmap, pos: 0 }))
}

struct MmapLines {
    mmap: Mmap,
    pos: usize,
}

impl Iterator for MmapLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let data: &[u8] = &self.mmap;
        if self.pos >= data.len() {
            return None;
        }
        let start = self.pos;
        let end = match memchr::memchr(b'\n', &data[start..]) {
            Some(off) => {
                self.pos = start + off + 1;
                start + off
            }
            None => {
                self.pos = data.len();
                data.len()
            }
        };
        let mut slice = &data[start..end];
        if slice.ends_with(b"\r") {
            slice = &slice[..slice.len() - 1];
        }
        // Exports are sometimes latin-1 mangled; the record sanitizer drops
        // whatever the lossy conversion leaves behind.
        Some(Ok(String::from_utf8_lossy(slice).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discovery_matches_suffix_and_derives_host() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("DC01.secretsdump.secrets"), "a:b\n").unwrap();
        std::fs::write(tmp.path().join("ws02.secretsdump.sam"), "x\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "irrelevant\n").unwrap();

        let secrets = discover_dumps(tmp.path(), DumpKind::Secrets).unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].host, "dc01");

        let sams = discover_dumps(tmp.path(), DumpKind::Sam).unwrap();
        assert_eq!(sams.len(), 1);
        assert_eq!(sams[0].host, "ws02");
    }

    #[test]
    fn discovery_skips_non_file_and_dangling_entries() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("ok.secretsdump.sam"), "x\n").unwrap();
        // A directory and a dangling symlink both carry the dump suffix but
        // hold no readable dump data.
        std::fs::create_dir(tmp.path().join("dir.secretsdump.sam")).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(
            tmp.path().join("missing-target"),
            tmp.path().join("ghost.secretsdump.sam"),
        )
        .unwrap();

        let found = discover_dumps(tmp.path(), DumpKind::Sam).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].host, "ok");
    }

    #[test]
    fn mmap_and_bufread_agree_on_crlf_content() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("h.secretsdump.sam");
        let mut f = File::create(&path).unwrap();
        write!(f, "line1\r\nline2\nline3").unwrap();
        drop(f);

        let buffered: Vec<String> =
            dump_lines(&path, u64::MAX).unwrap().map(|l| l.unwrap()).collect();
        let mapped: Vec<String> = dump_lines(&path, 0).unwrap().map(|l| l.unwrap()).collect();
        assert_eq!(buffered, vec!["line1", "line2", "line3"]);
        assert_eq!(buffered, mapped);
    }
}
