//! CLI entrypoint for `credaudit`.
//!
//! Discovers per-host secretsdump output in an engagement directory, loads it
//! through the library engine, correlates credential reuse, optionally drives
//! live verification behind an interactive gate, prints a terminal summary,
//! and writes CSV exports when an output directory is provided.
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{LevelFilter, error, info, warn};

use credaudit::{
    confirm::{Canned, Confirm, Decision, StdinConfirm},
    dump::DumpKind,
    engine::Engine,
    export::save_report_csv,
    io::{DEFAULT_MMAP_THRESHOLD_BYTES, discover_dumps},
    logsink::FileLog,
    record::VerifiedFinding,
    report::render_summary,
    verify::{DEFAULT_WORKERS, Orchestrator, VerifyConfig, probe_tool, success_label},
};

#[derive(Parser, Debug)]
#[command(
    name = "credaudit-rs",
    version,
    about = "Credential-dump auditor: correlates and verifies admin reuse"
)]
struct Args {
    /// Directory containing *.secretsdump.secrets / *.secretsdump.sam files
    #[arg(default_value = ".")]
    input: PathBuf,

    /// Path to the output directory for CSV exports
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Skip live verification entirely (report unverified candidates)
    #[arg(long = "skip-verify")]
    skip_verify: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long = "assume-yes")]
    assume_yes: bool,

    /// Worker cap for the verification pool
    #[arg(long = "threads", default_value_t = DEFAULT_WORKERS)]
    threads: usize,

    /// Per-attempt verification timeout in seconds
    #[arg(long = "timeout", default_value_t = 60)]
    timeout_secs: u64,

    /// Delay applied after each completed verification attempt, in ms
    #[arg(long = "pacing-ms", default_value_t = 250)]
    pacing_ms: u64,

    /// Override mmap threshold in bytes. If zero, disable mmap.
    #[arg(long = "mmap-threshold", default_value_t = DEFAULT_MMAP_THRESHOLD_BYTES)]
    mmap_threshold: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suppress summary output (still writes exports if -o is provided)
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

const ASCII_TITLE: &str = r#"
   ____                  _    _               _  _  _
  / ___| _ __  ___   __| |  / \   _   _   __| |(_)| |_
 | |    | '__|/ _ \ / _` | / _ \ | | | | / _` || || __|
 | |___ | |  |  __/| (_| |/ ___ \| |_| || (_| || || |_
  \____||_|   \___| \__,_/_/   \_\\__,_| \__,_||_| \__|
"#;

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn verify_inputs(args: &Args) -> Result<()> {
    if !args.input.is_dir() {
        bail!("input directory not found: {}", args.input.display());
    }
    Ok(())
}

/// Run the verification stage behind its confirmation gate. `None` means the
/// stage was skipped and the unverified candidate set stands.
fn run_verification(
    args: &Args,
    engine: &Engine,
    gate: &mut dyn Confirm,
) -> Option<Vec<VerifiedFinding>> {
    if args.skip_verify {
        return None;
    }
    let candidates = engine.reuse_candidates();
    if candidates.is_empty() {
        info!("no reuse candidates, skipping verification");
        return None;
    }
    let prompt = format!(
        "Run live verification of {} reuse candidate(s)?",
        candidates.len()
    );
    if !gate.ask(&prompt).is_yes() {
        info!("verification declined, reporting unverified candidates");
        return None;
    }

    let Some(checker) = probe_tool() else {
        error!("neither netexec nor crackmapexec is available, skipping verification");
        return None;
    };
    let log_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credaudit_verify.log");
    let sink = match FileLog::open(&log_path) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot open diagnostic log {}: {e}", log_path.display());
            return None;
        }
    };
    let config = VerifyConfig {
        workers: args.threads,
        timeout: Duration::from_secs(args.timeout_secs),
        pacing: Duration::from_millis(args.pacing_ms),
        success_label: success_label(),
    };
    let orchestrator = Orchestrator::new(&checker, &sink, config);
    match orchestrator.verify(&candidates) {
        Ok(findings) => {
            info!(
                "verification complete: {}/{} confirmed",
                findings.len(),
                candidates.len()
            );
            Some(findings)
        }
        Err(e) => {
            error!("verification stage failed: {e}");
            None
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);
    match args.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
        }
        ColorChoice::Auto => {}
    }
    if let Err(e) = verify_inputs(&args) {
        error!("{}", e);
        std::process::exit(2);
    }

    if let Some(outdir) = &args.output {
        if let Err(e) = fs::create_dir_all(outdir) {
            error!("failed to create output directory {}: {}", outdir.display(), e);
            std::process::exit(4);
        }
    }

    let secrets = match discover_dumps(&args.input, DumpKind::Secrets) {
        Ok(v) => v,
        Err(e) => {
            error!("failed to discover secrets dumps: {e}");
            std::process::exit(2);
        }
    };
    let sams = match discover_dumps(&args.input, DumpKind::Sam) {
        Ok(v) => v,
        Err(e) => {
            error!("failed to discover sam dumps: {e}");
            std::process::exit(2);
        }
    };
    if secrets.is_empty() && sams.is_empty() {
        warn!("no dump files found in {}", args.input.display());
    }

    let mut engine = Engine::new();
    let threshold = if args.mmap_threshold == 0 {
        u64::MAX
    } else {
        args.mmap_threshold
    };
    if let Err(e) = engine.load_from_dump_files_with_threshold(&secrets, &sams, threshold) {
        error!("failed to load inputs: {}", e);
        std::process::exit(3);
    }

    let mut gate: Box<dyn Confirm> = if args.assume_yes {
        Box::new(Canned(Decision::Yes))
    } else {
        Box::new(StdinConfirm)
    };

    let verified = run_verification(&args, &engine, gate.as_mut());
    let sanitize = gate
        .ask("Produce the sanitized (credential-free) variant as well?")
        .is_yes();
    let report = engine.assemble(verified, sanitize);

    if !args.quiet {
        println!("{}", ASCII_TITLE.bold().green());
        println!("{}", render_summary(&engine, &report));
    }

    if let Some(outdir) = &args.output {
        match save_report_csv(&report, outdir) {
            Ok(paths) => {
                for p in paths {
                    info!("wrote {}", p.display());
                }
            }
            Err(e) => {
                error!("failed to write exports: {}", e);
                std::process::exit(5);
            }
        }
    }
}
