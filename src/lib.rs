pub mod confirm;
pub mod correlate;
pub mod dump;
pub mod engine;
pub mod export;
pub mod io;
pub mod logsink;
pub mod noise;
pub mod record;
pub mod report;
pub mod verify;

pub mod prelude {
    pub use crate::record::{HashRecord, ReuseCandidate, SecretRecord, VerifiedFinding};
}
