//! rollcall-core — Face-embedding matching and attendance recording.
//!
//! Pure decision logic: no I/O. The embedding producer ([`EmbeddingOracle`])
//! and the persistence layer ([`RecordStore`]) are injected collaborators,
//! so every operation here can run against in-process fakes.

pub mod attendance;
pub mod enrollment;
pub mod matcher;
pub mod oracle;
pub mod store;
pub mod types;

pub use attendance::{record_attendance, MarkOutcome};
pub use enrollment::{
    aggregate_enrollment, check_quality, EnrollmentError, EnrollmentPolicy, QualityIssue,
};
pub use matcher::{match_embedding, MatchError, DEFAULT_MATCH_THRESHOLD};
pub use oracle::{EmbeddingOracle, FaceGeometry, FaceScan, OracleError};
pub use store::{NewAttendance, RecordStore, StoreError, STATUS_PRESENT};
pub use types::{
    confidence_from_distance, AttendanceRecord, Embedding, EmbeddingError, EnrolledFace,
    MatchDecision, Student,
};
