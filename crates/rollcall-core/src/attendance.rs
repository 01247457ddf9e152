//! Idempotent attendance recording.
//!
//! Per (student, date) the state machine is Unmarked → Marked, the
//! transition happens at most once, and Marked is terminal for that day.

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::{NewAttendance, RecordStore, StoreError};

/// Result of asking for attendance to be recorded. "Already marked" is a
/// normal outcome, not an error — only infrastructure failures error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MarkOutcome {
    Recorded { record_id: String },
    AlreadyMarked,
}

/// Record attendance for a matched student, at most once per day.
///
/// The pre-read is a fast path; the store's uniqueness constraint is the
/// authoritative guard, so a concurrent request that wins the race turns
/// this call's insert into [`MarkOutcome::AlreadyMarked`] rather than a
/// duplicate row.
pub fn record_attendance<S: RecordStore + ?Sized>(
    store: &S,
    student_id: &str,
    date: NaiveDate,
    confidence: Option<f32>,
) -> Result<MarkOutcome, StoreError> {
    if let Some(existing) = store.find_attendance(student_id, date)? {
        tracing::debug!(
            student = student_id,
            %date,
            record = %existing.id,
            "attendance already marked"
        );
        return Ok(MarkOutcome::AlreadyMarked);
    }

    match store.insert_attendance(NewAttendance {
        student_id,
        date,
        confidence,
    }) {
        Ok(record_id) => {
            tracing::info!(student = student_id, %date, record = %record_id, "attendance recorded");
            Ok(MarkOutcome::Recorded { record_id })
        }
        Err(StoreError::DuplicateAttendance) => Ok(MarkOutcome::AlreadyMarked),
        Err(e) => Err(e),
    }
}
