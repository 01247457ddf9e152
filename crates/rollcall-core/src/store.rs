//! Record store seam.
//!
//! Durable storage is an injected collaborator. The contract deliberately
//! requires the backing store to enforce (student, date) uniqueness itself —
//! see [`StoreError::DuplicateAttendance`] — so two concurrent recognitions
//! of the same person cannot both insert a row.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{AttendanceRecord, EnrolledFace};

/// Status written for every recognition-driven attendance row.
pub const STATUS_PRESENT: &str = "present";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store's (student, date) uniqueness constraint rejected an insert.
    /// The recorder treats this as the "already marked" outcome.
    #[error("attendance already recorded for this student and date")]
    DuplicateAttendance,
    #[error("student code already enrolled: {0}")]
    DuplicateStudent(String),
    #[error("student not found: {0}")]
    StudentNotFound(String),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record store corrupt: {0}")]
    Corrupt(String),
}

/// Attendance row to insert. The store assigns the id and the timestamp.
#[derive(Debug, Clone)]
pub struct NewAttendance<'a> {
    pub student_id: &'a str,
    pub date: NaiveDate,
    pub confidence: Option<f32>,
}

/// Read/write operations the matching and recording core needs from storage.
pub trait RecordStore {
    /// Representative embeddings of all active students, in a stable order.
    fn student_embeddings(&self) -> Result<Vec<EnrolledFace>, StoreError>;

    /// The attendance row for (student, date), if one exists.
    fn find_attendance(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Insert one attendance row, returning its new id. Must fail with
    /// [`StoreError::DuplicateAttendance`] when a row for the same
    /// (student, date) already exists.
    fn insert_attendance(&self, attendance: NewAttendance<'_>) -> Result<String, StoreError>;
}
