//! SQLite record store.
//!
//! One [`rusqlite::Connection`] behind a mutex; writes are serialized, which
//! is plenty for a single-school deployment. The interesting guarantees live
//! in the schema (active-code uniqueness, once-per-day attendance) — this
//! module's job is to translate constraint violations into the typed
//! [`StoreError`] variants the core understands.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use rollcall_core::store::STATUS_PRESENT;
use rollcall_core::{AttendanceRecord, Embedding, EnrolledFace, NewAttendance, RecordStore, StoreError};

use crate::crypto::EmbeddingCipher;
use crate::schema;

/// Student fields supplied at enrollment; the store assigns id and
/// enrollment timestamp.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub code: String,
    pub name: String,
    pub class_name: Option<String>,
    pub section: Option<String>,
}

/// One line of a daily attendance report: the record joined with the
/// student fields a register needs.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub code: String,
    pub name: String,
    pub class_name: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Stats {
    pub active_students: u64,
    pub attendance_today: u64,
    pub pending_queue: u64,
}

/// A queued write awaiting replay.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: String,
    pub operation: String,
    pub payload: serde_json::Value,
    pub retry_count: u32,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    cipher: EmbeddingCipher,
}

const STUDENT_COLUMNS: &str = "id, code, name, class_name, section, active, enrolled_at";
const ATTENDANCE_COLUMNS: &str = "id, student_id, date, timestamp, status, confidence";

impl SqliteStore {
    /// Open (or create) the database at `db_path`, loading the embedding key
    /// from `key_path` (created on first run).
    pub fn open(db_path: &Path, key_path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Unavailable(format!("creating {}: {e}", dir.display())))?;
        }

        let cipher = EmbeddingCipher::load_or_create(key_path)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let conn = Connection::open(db_path).map_err(map_sqlite)?;
        schema::apply_schema(&conn, busy_timeout).map_err(map_sqlite)?;

        tracing::info!(path = %db_path.display(), "record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    /// In-memory store for tests — same schema, no files.
    pub fn open_in_memory(cipher: EmbeddingCipher) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite)?;
        schema::apply_schema(&conn, Duration::from_millis(100)).map_err(map_sqlite)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))
    }

    fn seal_embedding(&self, embedding: &Embedding) -> Result<Vec<u8>, StoreError> {
        let json =
            serde_json::to_vec(embedding).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.cipher
            .seal(&json)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn open_embedding(&self, blob: &[u8]) -> Result<Embedding, StoreError> {
        let json = self
            .cipher
            .open(blob)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        serde_json::from_slice(&json)
            .map_err(|e| StoreError::Corrupt(format!("embedding blob: {e}")))
    }

    // --- students ---

    pub fn enroll_student(
        &self,
        new: &NewStudent,
        embedding: &Embedding,
    ) -> Result<rollcall_core::Student, StoreError> {
        let blob = self.seal_embedding(embedding)?;
        let id = Uuid::new_v4().to_string();
        let enrolled_at = Utc::now();

        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO students (id, code, name, class_name, section, embedding, active, enrolled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                id,
                new.code,
                new.name,
                new.class_name,
                new.section,
                blob,
                enrolled_at.to_rfc3339()
            ],
        );
        match result {
            Ok(_) => {
                tracing::info!(student = %new.code, id = %id, dim = embedding.len(), "student enrolled");
                Ok(rollcall_core::Student {
                    id,
                    code: new.code.clone(),
                    name: new.name.clone(),
                    class_name: new.class_name.clone(),
                    section: new.section.clone(),
                    active: true,
                    enrolled_at,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::DuplicateStudent(new.code.clone()))
            }
            Err(e) => Err(map_sqlite(e)),
        }
    }

    /// Overwrite the representative embedding of an active student.
    pub fn reenroll_student(
        &self,
        code: &str,
        embedding: &Embedding,
    ) -> Result<rollcall_core::Student, StoreError> {
        let blob = self.seal_embedding(embedding)?;
        {
            let conn = self.lock()?;
            let updated = conn
                .execute(
                    "UPDATE students SET embedding = ?1 WHERE code = ?2 AND active = 1",
                    params![blob, code],
                )
                .map_err(map_sqlite)?;
            if updated == 0 {
                return Err(StoreError::StudentNotFound(code.to_string()));
            }
        }
        tracing::info!(student = %code, dim = embedding.len(), "student re-enrolled");
        self.student_by_code(code)
    }

    pub fn student_by_code(&self, code: &str) -> Result<rollcall_core::Student, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE code = ?1 AND active = 1"),
            params![code],
            student_row,
        )
        .optional()
        .map_err(map_sqlite)?
        .ok_or_else(|| StoreError::StudentNotFound(code.to_string()))
        .and_then(to_student)
    }

    pub fn student_by_id(&self, id: &str) -> Result<rollcall_core::Student, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"),
            params![id],
            student_row,
        )
        .optional()
        .map_err(map_sqlite)?
        .ok_or_else(|| StoreError::StudentNotFound(id.to_string()))
        .and_then(to_student)
    }

    pub fn students(&self) -> Result<Vec<rollcall_core::Student>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STUDENT_COLUMNS} FROM students WHERE active = 1 ORDER BY name, code"
            ))
            .map_err(map_sqlite)?;
        let rows = stmt.query_map([], student_row).map_err(map_sqlite)?;

        let mut students = Vec::new();
        for row in rows {
            students.push(to_student(row.map_err(map_sqlite)?)?);
        }
        Ok(students)
    }

    /// Deactivate a student. Their attendance history is kept; their code
    /// becomes reusable for a fresh enrollment.
    pub fn deactivate_student(&self, code: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE students SET active = 0 WHERE code = ?1 AND active = 1",
                params![code],
            )
            .map_err(map_sqlite)?;
        if updated == 0 {
            return Err(StoreError::StudentNotFound(code.to_string()));
        }
        tracing::info!(student = %code, "student deactivated");
        Ok(())
    }

    // --- attendance reporting ---

    pub fn attendance_on(&self, date: NaiveDate) -> Result<Vec<ReportRow>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT a.id, a.student_id, a.date, a.timestamp, a.status, a.confidence,
                        s.code, s.name, s.class_name, s.section
                 FROM attendance a
                 JOIN students s ON s.id = a.student_id
                 WHERE a.date = ?1
                 ORDER BY a.timestamp DESC",
            )
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map(params![date.to_string()], |row| {
                Ok((
                    attendance_row(row)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })
            .map_err(map_sqlite)?;

        let mut report = Vec::new();
        for row in rows {
            let (raw, code, name, class_name, section) = row.map_err(map_sqlite)?;
            report.push(ReportRow {
                record: to_attendance(raw)?,
                code,
                name,
                class_name,
                section,
            });
        }
        Ok(report)
    }

    /// Most recent attendance for one student, newest first.
    pub fn student_history(
        &self,
        code: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let student = self.student_by_code(code)?;
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                 WHERE student_id = ?1 ORDER BY date DESC LIMIT ?2"
            ))
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map(params![student.id, limit], attendance_row)
            .map_err(map_sqlite)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(to_attendance(row.map_err(map_sqlite)?)?);
        }
        Ok(records)
    }

    pub fn stats(&self, today: NaiveDate) -> Result<Stats, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM students WHERE active = 1),
                (SELECT COUNT(*) FROM attendance WHERE date = ?1),
                (SELECT COUNT(*) FROM offline_queue)",
            params![today.to_string()],
            |row| {
                Ok(Stats {
                    active_students: row.get::<_, i64>(0)? as u64,
                    attendance_today: row.get::<_, i64>(1)? as u64,
                    pending_queue: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .map_err(map_sqlite)
    }

    // --- offline queue ---

    pub fn enqueue_offline(
        &self,
        operation: &str,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO offline_queue (id, operation, payload, queued_at, retry_count)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![id, operation, payload.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(map_sqlite)?;
        tracing::warn!(operation, id = %id, "write shunted to offline queue");
        Ok(id)
    }

    pub fn pending_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, operation, payload, retry_count FROM offline_queue
                 ORDER BY queued_at ASC",
            )
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                ))
            })
            .map_err(map_sqlite)?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, operation, payload, retry_count) = row.map_err(map_sqlite)?;
            let payload = serde_json::from_str(&payload)
                .map_err(|e| StoreError::Corrupt(format!("queue payload {id}: {e}")))?;
            entries.push(QueueEntry {
                id,
                operation,
                payload,
                retry_count,
            });
        }
        Ok(entries)
    }

    pub fn remove_queued(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM offline_queue WHERE id = ?1", params![id])
            .map_err(map_sqlite)?;
        Ok(())
    }

    pub fn bump_retry(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE offline_queue SET retry_count = retry_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(map_sqlite)?;
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn student_embeddings(&self) -> Result<Vec<EnrolledFace>, StoreError> {
        let blobs: Vec<(String, Vec<u8>)> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    // Stable order: the matcher's tie-break depends on it.
                    "SELECT id, embedding FROM students WHERE active = 1
                     ORDER BY enrolled_at ASC, id ASC",
                )
                .map_err(map_sqlite)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(map_sqlite)?;
            rows.collect::<Result<_, _>>().map_err(map_sqlite)?
        };

        let mut gallery = Vec::with_capacity(blobs.len());
        for (student_id, blob) in blobs {
            gallery.push(EnrolledFace {
                embedding: self.open_embedding(&blob)?,
                student_id,
            });
        }
        Ok(gallery)
    }

    fn find_attendance(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                     WHERE student_id = ?1 AND date = ?2"
                ),
                params![student_id, date.to_string()],
                attendance_row,
            )
            .optional()
            .map_err(map_sqlite)?;
        raw.map(to_attendance).transpose()
    }

    fn insert_attendance(&self, attendance: NewAttendance<'_>) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO attendance (id, student_id, date, timestamp, status, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                attendance.student_id,
                attendance.date.to_string(),
                Utc::now().to_rfc3339(),
                STATUS_PRESENT,
                attendance.confidence.map(f64::from)
            ],
        );
        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateAttendance),
            Err(e) => Err(map_sqlite(e)),
        }
    }
}

type StudentRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    String,
);

fn student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn to_student(raw: StudentRow) -> Result<rollcall_core::Student, StoreError> {
    let (id, code, name, class_name, section, active, enrolled_at) = raw;
    Ok(rollcall_core::Student {
        id,
        code,
        name,
        class_name,
        section,
        active: active != 0,
        enrolled_at: parse_timestamp(&enrolled_at)?,
    })
}

type AttendanceRow = (String, String, String, String, String, Option<f64>);

fn attendance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_attendance(raw: AttendanceRow) -> Result<AttendanceRecord, StoreError> {
    let (id, student_id, date, timestamp, status, confidence) = raw;
    Ok(AttendanceRecord {
        id,
        student_id,
        date: parse_date(&date)?,
        timestamp: parse_timestamp(&timestamp)?,
        status,
        confidence: confidence.map(|c| c as f32),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    s.parse()
        .map_err(|e| StoreError::Corrupt(format!("bad date {s:?}: {e}")))
}

fn map_sqlite(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{record_attendance, MarkOutcome};

    fn mem_store() -> SqliteStore {
        SqliteStore::open_in_memory(EmbeddingCipher::from_key_bytes(&[9u8; 32])).unwrap()
    }

    fn new_student(code: &str) -> NewStudent {
        NewStudent {
            code: code.to_string(),
            name: format!("Student {code}"),
            class_name: Some("5".to_string()),
            section: Some("A".to_string()),
        }
    }

    fn embedding(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    #[test]
    fn test_enroll_and_read_back_gallery() {
        let store = mem_store();
        let s1 = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0, 0.0, 0.0]))
            .unwrap();
        let s2 = store
            .enroll_student(&new_student("S2"), &embedding(&[0.0, 1.0, 0.0]))
            .unwrap();

        let gallery = store.student_embeddings().unwrap();
        assert_eq!(gallery.len(), 2);
        // Enrollment order is preserved.
        assert_eq!(gallery[0].student_id, s1.id);
        assert_eq!(gallery[1].student_id, s2.id);
        assert_eq!(gallery[0].embedding.as_slice(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_embeddings_are_not_stored_in_the_clear() {
        let store = mem_store();
        store
            .enroll_student(&new_student("S1"), &embedding(&[0.5, 0.25]))
            .unwrap();

        let blob: Vec<u8> = {
            let conn = store.lock().unwrap();
            conn.query_row("SELECT embedding FROM students", [], |row| row.get(0))
                .unwrap()
        };
        let plaintext = serde_json::to_vec(&embedding(&[0.5, 0.25])).unwrap();
        assert_ne!(blob, plaintext);
        assert!(blob.len() > plaintext.len());
    }

    #[test]
    fn test_duplicate_active_code_rejected() {
        let store = mem_store();
        store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();
        let err = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateStudent("S1".to_string()));
    }

    #[test]
    fn test_code_reusable_after_deactivation() {
        let store = mem_store();
        store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();
        store.deactivate_student("S1").unwrap();
        // The unique index only covers active rows.
        store
            .enroll_student(&new_student("S1"), &embedding(&[0.5]))
            .unwrap();

        assert_eq!(store.students().unwrap().len(), 1);
        assert_eq!(store.student_embeddings().unwrap().len(), 1);
    }

    #[test]
    fn test_deactivate_unknown_student() {
        let store = mem_store();
        assert_eq!(
            store.deactivate_student("ghost").unwrap_err(),
            StoreError::StudentNotFound("ghost".to_string())
        );
    }

    #[test]
    fn test_reenroll_overwrites_embedding() {
        let store = mem_store();
        store
            .enroll_student(&new_student("S1"), &embedding(&[1.0, 0.0]))
            .unwrap();
        store
            .reenroll_student("S1", &embedding(&[0.0, 1.0]))
            .unwrap();

        let gallery = store.student_embeddings().unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].embedding.as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn test_attendance_unique_per_student_and_day() {
        let store = mem_store();
        let s1 = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();

        store
            .insert_attendance(NewAttendance {
                student_id: &s1.id,
                date: day(),
                confidence: Some(0.9),
            })
            .unwrap();
        let err = store
            .insert_attendance(NewAttendance {
                student_id: &s1.id,
                date: day(),
                confidence: Some(0.8),
            })
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateAttendance);
    }

    #[test]
    fn test_recorder_is_idempotent_against_sqlite() {
        let store = mem_store();
        let s1 = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();

        let first = record_attendance(&store, &s1.id, day(), Some(0.86)).unwrap();
        assert!(matches!(first, MarkOutcome::Recorded { .. }));

        let second = record_attendance(&store, &s1.id, day(), Some(0.91)).unwrap();
        assert_eq!(second, MarkOutcome::AlreadyMarked);

        let report = store.attendance_on(day()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].code, "S1");
        assert_eq!(report[0].record.status, STATUS_PRESENT);
        assert_eq!(report[0].record.confidence, Some(0.86));
    }

    #[test]
    fn test_find_attendance_round_trip() {
        let store = mem_store();
        let s1 = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();

        assert!(store.find_attendance(&s1.id, day()).unwrap().is_none());

        let id = store
            .insert_attendance(NewAttendance {
                student_id: &s1.id,
                date: day(),
                confidence: None,
            })
            .unwrap();

        let found = store.find_attendance(&s1.id, day()).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.date, day());
        assert_eq!(found.confidence, None);
    }

    #[test]
    fn test_student_history_newest_first_with_limit() {
        let store = mem_store();
        let s1 = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();
        for d in 1..=5 {
            store
                .insert_attendance(NewAttendance {
                    student_id: &s1.id,
                    date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
                    confidence: None,
                })
                .unwrap();
        }

        let history = store.student_history("S1", 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(history[2].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn test_stats_counts() {
        let store = mem_store();
        let s1 = store
            .enroll_student(&new_student("S1"), &embedding(&[1.0]))
            .unwrap();
        store
            .enroll_student(&new_student("S2"), &embedding(&[0.0]))
            .unwrap();
        store
            .insert_attendance(NewAttendance {
                student_id: &s1.id,
                date: day(),
                confidence: None,
            })
            .unwrap();
        store
            .enqueue_offline("record_attendance", &serde_json::json!({"student_id": "x"}))
            .unwrap();

        let stats = store.stats(day()).unwrap();
        assert_eq!(stats.active_students, 2);
        assert_eq!(stats.attendance_today, 1);
        assert_eq!(stats.pending_queue, 1);
    }

    #[test]
    fn test_offline_queue_lifecycle() {
        let store = mem_store();
        let payload = serde_json::json!({"student_id": "abc", "date": "2024-01-10"});
        let id = store.enqueue_offline("record_attendance", &payload).unwrap();

        let pending = store.pending_queue().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, "record_attendance");
        assert_eq!(pending[0].payload, payload);
        assert_eq!(pending[0].retry_count, 0);

        store.bump_retry(&id).unwrap();
        assert_eq!(store.pending_queue().unwrap()[0].retry_count, 1);

        store.remove_queued(&id).unwrap();
        assert!(store.pending_queue().unwrap().is_empty());
    }
}
