//! Yes/no confirmation gates for the stages that touch the network or emit a
//! shareable artifact. The prompt mechanism is injected so the pipeline never
//! blocks on a console that is not there; a closed input stream is a safe
//! "skip", not an error.
use std::io::{BufRead, Write};

/// Outcome of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
    /// Prompt could not be answered (input stream closed, non-interactive
    /// run). Callers treat this like `No`.
    Unavailable,
}

impl Decision {
    pub fn is_yes(self) -> bool {
        matches!(self, Decision::Yes)
    }
}

/// Source of yes/no decisions gating pipeline stages.
pub trait Confirm {
    fn ask(&mut self, prompt: &str) -> Decision;
}

/// Interactive prompt on stdin/stderr. Accepts `y`/`yes` (any case) as yes,
/// anything else as no, and EOF as unavailable.
#[derive(Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn ask(&mut self, prompt: &str) -> Decision {
        eprint!("{prompt} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => Decision::Unavailable,
            Ok(_) => match line.trim().to_lowercase().as_str() {
                "y" | "yes" => Decision::Yes,
                _ => Decision::No,
            },
        }
    }
}

/// Fixed answer for every prompt; `--assume-yes` and tests use this.
pub struct Canned(pub Decision);

impl Confirm for Canned {
    fn ask(&mut self, _prompt: &str) -> Decision {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_returns_fixed_decision() {
        let mut c = Canned(Decision::Yes);
        assert_eq!(c.ask("run verification?"), Decision::Yes);
        assert!(c.ask("again?").is_yes());
        let mut n = Canned(Decision::Unavailable);
        assert!(!n.ask("x").is_yes());
    }
}
