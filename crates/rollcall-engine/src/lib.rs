//! rollcall-engine — Service layer tying oracle, matcher, and store together.
//!
//! A dedicated engine thread owns the record store and the embedding oracle;
//! callers talk to it through a clone-safe async [`EngineHandle`]. The
//! matching step itself is pure and fast — only oracle and store calls can
//! stall, and both sit behind the per-request timeout.

pub mod config;
pub mod engine;
pub mod oracle_cmd;

pub use config::Config;
pub use engine::{
    replay_queue, spawn_engine, AttendanceStatus, EngineError, EngineHandle, EnginePolicy,
    EngineStore, EnrollOutcome, QueueFlushReport, RecognizeOutcome,
};
pub use oracle_cmd::CommandOracle;
