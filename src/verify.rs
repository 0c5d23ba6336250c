//! Live verification of reuse candidates against their hosts.
//!
//! One external SMB authentication tool drives every attempt; the tool is
//! probed once per run (`netexec` preferred, `crackmapexec` as fallback) and
//! injected into the orchestrator as a [`CredCheck`] capability. Candidates
//! fan out over a bounded rayon pool, each attempt hard-capped by a timeout,
//! and only confirmed successes reach the collector. A failed, errored, or
//! timed-out attempt drops its candidate and leaves a diagnostic entry; it
//! never aborts the run.
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info};
use rayon::prelude::*;

use crate::logsink::LogSink;
use crate::record::{ReuseCandidate, VerifiedFinding};

/// Tool names probed for, in preference order.
pub const TOOL_CANDIDATES: &[&str] = &["netexec", "crackmapexec"];

/// Success marker used when the tool configuration does not supply one.
pub const DEFAULT_SUCCESS_LABEL: &str = "Pwn3d";

/// Default worker cap for the verification pool.
pub const DEFAULT_WORKERS: usize = 10;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default inter-completion pacing delay. Courtesy throttle only.
pub const DEFAULT_PACING: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
    #[error("i/o on child process: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability to attempt one authentication against one host. Implementations
/// must be shareable across the worker pool.
pub trait CredCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Run one attempt and return the tool's raw textual output. Success is
    /// decided by the caller, not here.
    fn attempt(&self, candidate: &ReuseCandidate, timeout: Duration) -> Result<String, CheckError>;
}

/// [`CredCheck`] backed by an external pass-the-hash SMB tool.
pub struct SubprocessCheck {
    program: String,
}

impl SubprocessCheck {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args_for(candidate: &ReuseCandidate) -> Vec<String> {
        vec![
            "smb".to_string(),
            candidate.host.clone(),
            "-u".to_string(),
            candidate.account.clone(),
            "-H".to_string(),
            candidate.nt_hash.clone(),
            "--local-auth".to_string(),
        ]
    }
}

impl CredCheck for SubprocessCheck {
    fn name(&self) -> &str {
        &self.program
    }

    fn attempt(&self, candidate: &ReuseCandidate, timeout: Duration) -> Result<String, CheckError> {
        run_with_timeout(&self.program, &Self::args_for(candidate), timeout)
    }
}

/// Spawn `program` with `args`, kill it past `timeout`, and return combined
/// stdout/stderr. The child is polled rather than waited on so the deadline
/// can interrupt it; both pipes are drained concurrently, since a child that
/// fills the pipe buffer would otherwise block on write and hang until the
/// deadline kills it.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, CheckError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CheckError::Spawn {
            tool: program.to_string(),
            source,
        })?;

    let stdout_reader = drain_pipe(child.stdout.take());
    let stderr_reader = drain_pipe(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    loop {
        match child.try_wait()? {
            Some(_) => break,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                timed_out = true;
                break;
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    }

    // Exit (or kill) closes the write ends, so the readers hit EOF.
    let mut bytes = stdout_reader.join().unwrap_or_default();
    bytes.extend(stderr_reader.join().unwrap_or_default());
    if timed_out {
        return Err(CheckError::Timeout(timeout));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn drain_pipe<R>(pipe: Option<R>) -> std::thread::JoinHandle<Vec<u8>>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Probe for the first available tool name. One probe per run; every worker
/// uses the same tool.
pub fn probe_tool() -> Option<SubprocessCheck> {
    probe_first(TOOL_CANDIDATES)
}

pub fn probe_first(names: &[&str]) -> Option<SubprocessCheck> {
    for name in names {
        match Command::new(name)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => {
                debug!("verification tool available: {name}");
                return Some(SubprocessCheck::new(*name));
            }
            Err(e) => debug!("verification tool {name} not available: {e}"),
        }
    }
    None
}

/// Resolve the success marker from the tool's configuration, falling back to
/// [`DEFAULT_SUCCESS_LABEL`]. netexec and crackmapexec both keep a
/// `pwn3d_label` key in an ini-style config under the user's home directory.
pub fn success_label() -> String {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return DEFAULT_SUCCESS_LABEL.to_string();
    };
    let paths = [home.join(".nxc/nxc.conf"), home.join(".cme/cme.conf")];
    success_label_from(&paths)
}

pub fn success_label_from(paths: &[PathBuf]) -> String {
    for path in paths {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.trim() == "pwn3d_label" && !value.trim().is_empty() {
                return value.trim().to_string();
            }
        }
    }
    DEFAULT_SUCCESS_LABEL.to_string()
}

/// Tunables for one verification run.
pub struct VerifyConfig {
    pub workers: usize,
    pub timeout: Duration,
    pub pacing: Duration,
    pub success_label: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            pacing: DEFAULT_PACING,
            success_label: DEFAULT_SUCCESS_LABEL.to_string(),
        }
    }
}

/// Dispatches reuse candidates to a bounded worker pool and collects the
/// confirmed findings. The collector and diagnostic sink are the only shared
/// state; both are append-only and order-independent.
pub struct Orchestrator<'a> {
    checker: &'a dyn CredCheck,
    log: &'a dyn LogSink,
    config: VerifyConfig,
    completed: AtomicUsize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(checker: &'a dyn CredCheck, log: &'a dyn LogSink, config: VerifyConfig) -> Self {
        Self {
            checker,
            log,
            config,
            completed: AtomicUsize::new(0),
        }
    }

    /// Candidates completed so far; progress only, never affects results.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Verify every candidate once. Completion order is arbitrary; the
    /// returned findings are exactly the confirmed subset of `candidates`.
    pub fn verify(&self, candidates: &[ReuseCandidate]) -> anyhow::Result<Vec<VerifiedFinding>> {
        let total = candidates.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()?;
        let findings: Mutex<Vec<VerifiedFinding>> = Mutex::new(Vec::new());

        pool.install(|| {
            candidates.par_iter().for_each(|candidate| {
                if let Some(finding) = self.attempt_one(candidate) {
                    let mut acc = match findings.lock() {
                        Ok(v) => v,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    acc.push(finding);
                }
                let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
                info!("verification progress: {done}/{total}");
                if !self.config.pacing.is_zero() {
                    std::thread::sleep(self.config.pacing);
                }
            });
        });

        Ok(findings.into_inner().unwrap_or_else(|p| p.into_inner()))
    }

    fn attempt_one(&self, candidate: &ReuseCandidate) -> Option<VerifiedFinding> {
        let context = format!(
            "{} smb {} -u {} -H {} --local-auth",
            self.checker.name(),
            candidate.host,
            candidate.account,
            candidate.nt_hash,
        );
        match self.checker.attempt(candidate, self.config.timeout) {
            Ok(output) => {
                self.log
                    .append(&format!("{context}\n{}", output.trim_end()));
                if output.contains(&self.config.success_label) {
                    Some(VerifiedFinding::from(candidate))
                } else {
                    debug!(
                        "no success marker for {}@{}",
                        candidate.account, candidate.host
                    );
                    None
                }
            }
            Err(e) => {
                self.log.append(&format!(
                    "error verifying {}@{}: {e} ({context})",
                    candidate.account, candidate.host
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logsink::MemoryLog;
    use crate::record::HashRecord;
    use std::collections::HashSet;

    struct FakeCheck;

    impl CredCheck for FakeCheck {
        fn name(&self) -> &str {
            "fake"
        }

        // Outcome keyed on host name: "good-*" succeeds, "slow-*" times out,
        // everything else fails cleanly.
        fn attempt(
            &self,
            candidate: &ReuseCandidate,
            timeout: Duration,
        ) -> Result<String, CheckError> {
            if candidate.host.starts_with("good") {
                Ok(format!("SMB {} 445 [+] (Pwn3d!)", candidate.host))
            } else if candidate.host.starts_with("slow") {
                Err(CheckError::Timeout(timeout))
            } else {
                Ok(format!("SMB {} 445 [-] STATUS_LOGON_FAILURE", candidate.host))
            }
        }
    }

    fn candidate(host: &str) -> ReuseCandidate {
        HashRecord::new(host, "administrator", "8846f7eaee8fb117ad06bdd830b7586c").unwrap()
    }

    fn fast_config() -> VerifyConfig {
        VerifyConfig {
            pacing: Duration::ZERO,
            ..VerifyConfig::default()
        }
    }

    #[test]
    fn collects_only_confirmed_subset_of_dispatched() {
        let candidates: Vec<ReuseCandidate> = vec![
            candidate("good-1"),
            candidate("bad-1"),
            candidate("good-2"),
            candidate("bad-2"),
        ];
        let log = MemoryLog::new();
        let orch = Orchestrator::new(&FakeCheck, &log, fast_config());
        let findings = orch.verify(&candidates).unwrap();
        assert_eq!(findings.len(), 2);
        let dispatched: HashSet<(String, String, String)> = candidates
            .iter()
            .map(|c| (c.host.clone(), c.account.clone(), c.nt_hash.clone()))
            .collect();
        for f in &findings {
            assert!(dispatched.contains(&(f.host.clone(), f.account.clone(), f.nt_hash.clone())));
        }
        assert_eq!(orch.completed(), 4);
    }

    #[test]
    fn timeout_drops_candidate_with_one_log_entry() {
        let candidates = vec![candidate("slow-1")];
        let log = MemoryLog::new();
        let orch = Orchestrator::new(&FakeCheck, &log, fast_config());
        let findings = orch.verify(&candidates).unwrap();
        assert!(findings.is_empty());
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("administrator@slow-1"));
        assert!(entries[0].contains("timed out"));
    }

    #[test]
    fn empty_candidate_set_is_a_no_op() {
        let log = MemoryLog::new();
        let orch = Orchestrator::new(&FakeCheck, &log, fast_config());
        assert!(orch.verify(&[]).unwrap().is_empty());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn run_with_timeout_kills_overrunning_child() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let started = Instant::now();
        let res = run_with_timeout("sh", &args, Duration::from_millis(200));
        assert!(matches!(res, Err(CheckError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn run_with_timeout_drains_output_larger_than_pipe_buffer() {
        // 256 KiB of noise before the marker; more than a pipe buffer holds.
        let script = "head -c 262144 /dev/zero | tr '\\0' 'x'; echo Pwn3d!";
        let args = vec!["-c".to_string(), script.to_string()];
        let out = run_with_timeout("sh", &args, Duration::from_secs(5)).unwrap();
        assert!(out.len() >= 262144);
        assert!(out.contains("Pwn3d!"));
    }

    #[test]
    fn run_with_timeout_captures_output() {
        let args = vec!["-c".to_string(), "echo Pwn3d!".to_string()];
        let out = run_with_timeout("sh", &args, Duration::from_secs(5)).unwrap();
        assert!(out.contains("Pwn3d!"));
    }

    #[test]
    fn probe_skips_missing_tool_and_finds_fallback() {
        let check = probe_first(&["credaudit-no-such-tool-1f3a", "sh"]).unwrap();
        assert_eq!(check.name(), "sh");
        assert!(probe_first(&["credaudit-no-such-tool-1f3a"]).is_none());
    }

    #[test]
    fn success_label_read_from_config_with_default() {
        let tmp = tempfile::tempdir().unwrap();
        let conf = tmp.path().join("nxc.conf");
        std::fs::write(&conf, "[nxc]\nworkspace = default\npwn3d_label = OWNED\n").unwrap();
        assert_eq!(success_label_from(&[conf.clone()]), "OWNED");
        assert_eq!(
            success_label_from(&[tmp.path().join("missing.conf")]),
            DEFAULT_SUCCESS_LABEL
        );
    }
}
