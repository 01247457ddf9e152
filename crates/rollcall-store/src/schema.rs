//! Database schema.
//!
//! Applied idempotently on every open. The `UNIQUE (student_id, date)`
//! constraint on `attendance` is the authoritative once-per-day guard: the
//! application's pre-read is only a fast path, the constraint is what two
//! concurrent writers actually race on.

use rusqlite::Connection;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id          TEXT PRIMARY KEY,
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    class_name  TEXT,
    section     TEXT,
    embedding   BLOB NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    enrolled_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_students_active_code
    ON students (code) WHERE active = 1;

CREATE TABLE IF NOT EXISTS attendance (
    id          TEXT PRIMARY KEY,
    student_id  TEXT NOT NULL REFERENCES students (id),
    date        TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'present',
    confidence  REAL,
    UNIQUE (student_id, date)
);

CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance (date);

CREATE TABLE IF NOT EXISTS offline_queue (
    id          TEXT PRIMARY KEY,
    operation   TEXT NOT NULL,
    payload     TEXT NOT NULL,
    queued_at   TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);
";

/// Apply pragmas and DDL. Safe to call on an already-initialized database.
pub fn apply_schema(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    // WAL lets report reads proceed while a recognition writes.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
