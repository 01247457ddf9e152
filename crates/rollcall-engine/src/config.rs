use std::path::PathBuf;
use std::time::Duration;

use rollcall_core::enrollment::{CENTER_TOLERANCE, ENROLLMENT_CAPTURES, MIN_FACE_SIZE_PX};
use rollcall_core::{EnrollmentPolicy, DEFAULT_MATCH_THRESHOLD};

use crate::engine::EnginePolicy;

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the embedding encryption key (created on first run).
    pub key_path: PathBuf,
    /// External oracle command line: reads an image on stdin, prints a scan
    /// as JSON on stdout. Unset means image-based operations are unavailable.
    pub oracle_cmd: Option<String>,
    /// Minimum confidence (0–1) for a positive match.
    pub match_threshold: f32,
    /// Exact number of photos required per enrollment.
    pub enroll_captures: usize,
    /// Minimum face bounding-box size in pixels, both axes.
    pub min_face_size: f32,
    /// Maximum face-center offset from frame center, per axis, as a
    /// fraction of the half-frame.
    pub center_tolerance: f32,
    /// Timeout for one oracle invocation.
    pub oracle_timeout_secs: u64,
    /// SQLite busy timeout.
    pub store_timeout_secs: u64,
    /// End-to-end timeout for one engine request.
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let key_path = std::env::var("ROLLCALL_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("embedding.key"));

        Self {
            db_path,
            key_path,
            oracle_cmd: std::env::var("ROLLCALL_ORACLE_CMD").ok(),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            enroll_captures: env_usize("ROLLCALL_ENROLL_CAPTURES", ENROLLMENT_CAPTURES),
            min_face_size: env_f32("ROLLCALL_MIN_FACE_SIZE", MIN_FACE_SIZE_PX),
            center_tolerance: env_f32("ROLLCALL_CENTER_TOLERANCE", CENTER_TOLERANCE),
            oracle_timeout_secs: env_u64("ROLLCALL_ORACLE_TIMEOUT_SECS", 10),
            store_timeout_secs: env_u64("ROLLCALL_STORE_TIMEOUT_SECS", 5),
            request_timeout_secs: env_u64("ROLLCALL_REQUEST_TIMEOUT_SECS", 30),
        }
    }

    pub fn enrollment_policy(&self) -> EnrollmentPolicy {
        EnrollmentPolicy {
            captures: self.enroll_captures,
            min_face_size: self.min_face_size,
            center_tolerance: self.center_tolerance,
        }
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            match_threshold: self.match_threshold,
            enrollment: self.enrollment_policy(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
