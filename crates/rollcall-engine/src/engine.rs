use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::{
    aggregate_enrollment, check_quality, match_embedding, record_attendance, Embedding,
    EmbeddingError, EmbeddingOracle, EnrollmentError, EnrollmentPolicy, MarkOutcome, MatchDecision,
    MatchError, OracleError, QualityIssue, RecordStore, StoreError, Student,
    DEFAULT_MATCH_THRESHOLD,
};
use rollcall_store::{NewStudent, QueueEntry, SqliteStore};

/// Queue operation name for a deferred attendance write.
const OP_RECORD_ATTENDANCE: &str = "record_attendance";

#[derive(Error, Debug)]
pub enum EngineError {
    /// Oracle rejection of one enrollment photo; `photo` is 1-based.
    #[error("photo {photo}: {source}")]
    PhotoRejected {
        photo: usize,
        #[source]
        source: OracleError,
    },
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("capture rejected: {0}")]
    Quality(#[from] QualityIssue),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    /// Empty gallery — distinct from a below-threshold match, which is a
    /// normal outcome.
    #[error("no students enrolled yet — enroll students first")]
    NoneEnrolled,
    #[error("gallery incompatible with query embedding: {0}")]
    Dimension(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<MatchError> for EngineError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::NoCandidates => EngineError::NoneEnrolled,
            MatchError::Dimension(d) => EngineError::Dimension(d),
        }
    }
}

/// Matching and enrollment parameters, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub match_threshold: f32,
    pub enrollment: EnrollmentPolicy,
    pub request_timeout: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            enrollment: EnrollmentPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything the engine needs from storage: the core matching/recording
/// contract plus the student registry and the offline queue.
pub trait EngineStore: RecordStore + Send {
    fn enroll_student(
        &self,
        new: &NewStudent,
        embedding: &Embedding,
    ) -> Result<Student, StoreError>;
    fn reenroll_student(&self, code: &str, embedding: &Embedding) -> Result<Student, StoreError>;
    fn student_by_id(&self, id: &str) -> Result<Student, StoreError>;
    fn enqueue_offline(
        &self,
        operation: &str,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError>;
    fn pending_queue(&self) -> Result<Vec<QueueEntry>, StoreError>;
    fn remove_queued(&self, id: &str) -> Result<(), StoreError>;
    fn bump_retry(&self, id: &str) -> Result<(), StoreError>;
}

impl EngineStore for SqliteStore {
    fn enroll_student(
        &self,
        new: &NewStudent,
        embedding: &Embedding,
    ) -> Result<Student, StoreError> {
        SqliteStore::enroll_student(self, new, embedding)
    }

    fn reenroll_student(&self, code: &str, embedding: &Embedding) -> Result<Student, StoreError> {
        SqliteStore::reenroll_student(self, code, embedding)
    }

    fn student_by_id(&self, id: &str) -> Result<Student, StoreError> {
        SqliteStore::student_by_id(self, id)
    }

    fn enqueue_offline(
        &self,
        operation: &str,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError> {
        SqliteStore::enqueue_offline(self, operation, payload)
    }

    fn pending_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        SqliteStore::pending_queue(self)
    }

    fn remove_queued(&self, id: &str) -> Result<(), StoreError> {
        SqliteStore::remove_queued(self, id)
    }

    fn bump_retry(&self, id: &str) -> Result<(), StoreError> {
        SqliteStore::bump_retry(self, id)
    }
}

/// Result of an enrollment request.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub student: Student,
    /// True when an existing enrollment was overwritten.
    pub updated: bool,
}

/// What happened to the attendance write that follows a positive match.
/// Kept separate from the match decision: a failed write must never turn a
/// successful recognition into an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "attendance", rename_all = "snake_case")]
pub enum AttendanceStatus {
    Recorded { record_id: String },
    AlreadyMarked,
    /// The write failed; `queued` says whether it reached the offline queue.
    Failed { queued: bool },
    /// No match above threshold, nothing to record.
    Skipped,
}

/// Result of a recognition request. The decision always names the best
/// candidate; `student` is populated only on a positive match.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizeOutcome {
    pub decision: MatchDecision,
    pub student: Option<Student>,
    pub attendance: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueFlushReport {
    pub replayed: usize,
    pub requeued: usize,
}

/// Messages sent from handles to the engine thread.
enum EngineRequest {
    Enroll {
        student: NewStudent,
        photos: Vec<Vec<u8>>,
        overwrite: bool,
        reply: oneshot::Sender<Result<EnrollOutcome, EngineError>>,
    },
    Recognize {
        photo: Vec<u8>,
        reply: oneshot::Sender<Result<RecognizeOutcome, EngineError>>,
    },
    FlushQueue {
        reply: oneshot::Sender<Result<QueueFlushReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    request_timeout: Duration,
}

impl EngineHandle {
    /// Enroll a student from capture photos; `overwrite` re-enrolls an
    /// existing code instead of failing on it.
    pub async fn enroll(
        &self,
        student: NewStudent,
        photos: Vec<Vec<u8>>,
        overwrite: bool,
    ) -> Result<EnrollOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                student,
                photos,
                overwrite,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        self.await_reply(reply_rx).await
    }

    /// Recognize one photo and, on a positive match, mark today's attendance.
    pub async fn recognize(&self, photo: Vec<u8>) -> Result<RecognizeOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                photo,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        self.await_reply(reply_rx).await
    }

    /// Replay queued attendance writes.
    pub async fn flush_queue(&self) -> Result<QueueFlushReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::FlushQueue { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        self.await_reply(reply_rx).await
    }

    async fn await_reply<T>(
        &self,
        reply_rx: oneshot::Receiver<Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Err(_) => Err(EngineError::Timeout(self.request_timeout)),
            Ok(reply) => reply.map_err(|_| EngineError::ChannelClosed)?,
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread takes ownership of the store and the oracle and serves
/// requests until every handle is dropped.
pub fn spawn_engine<S: EngineStore + 'static>(
    store: S,
    mut oracle: Box<dyn EmbeddingOracle>,
    policy: EnginePolicy,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let request_timeout = policy.request_timeout;

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(
                threshold = policy.match_threshold,
                captures = policy.enrollment.captures,
                "engine thread started"
            );
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        student,
                        photos,
                        overwrite,
                        reply,
                    } => {
                        let result =
                            run_enroll(&store, oracle.as_mut(), &policy, student, photos, overwrite);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Recognize { photo, reply } => {
                        let result = run_recognize(&store, oracle.as_mut(), &policy, &photo);
                        let _ = reply.send(result);
                    }
                    EngineRequest::FlushQueue { reply } => {
                        let _ = reply.send(replay_queue(&store));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle {
        tx,
        request_timeout,
    }
}

/// One embedding per photo, quality gate, aggregate, persist.
fn run_enroll<S: EngineStore>(
    store: &S,
    oracle: &mut dyn EmbeddingOracle,
    policy: &EnginePolicy,
    student: NewStudent,
    photos: Vec<Vec<u8>>,
    overwrite: bool,
) -> Result<EnrollOutcome, EngineError> {
    if photos.len() != policy.enrollment.captures {
        return Err(EnrollmentError::WrongCaptureCount {
            expected: policy.enrollment.captures,
            got: photos.len(),
        }
        .into());
    }

    let mut scans = Vec::with_capacity(photos.len());
    for (i, photo) in photos.iter().enumerate() {
        let scan = oracle
            .embed(photo)
            .map_err(|source| EngineError::PhotoRejected {
                photo: i + 1,
                source,
            })?;
        scans.push(scan);
    }

    let embedding = aggregate_enrollment(&scans, &policy.enrollment)?;

    match store.enroll_student(&student, &embedding) {
        Ok(student) => {
            tracing::info!(student = %student.code, "enrollment complete");
            Ok(EnrollOutcome {
                student,
                updated: false,
            })
        }
        Err(StoreError::DuplicateStudent(code)) if overwrite => {
            let student = store.reenroll_student(&code, &embedding)?;
            tracing::info!(student = %student.code, "re-enrollment complete");
            Ok(EnrollOutcome {
                student,
                updated: true,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Embed, match against the gallery, then mark attendance for today.
///
/// The match and the attendance write are two independently-failable steps:
/// a store failure after a positive match is reported inside the outcome
/// (and shunted to the offline queue), never as a request error.
fn run_recognize<S: EngineStore>(
    store: &S,
    oracle: &mut dyn EmbeddingOracle,
    policy: &EnginePolicy,
    photo: &[u8],
) -> Result<RecognizeOutcome, EngineError> {
    let scan = oracle.embed(photo)?;
    check_quality(&scan.geometry, &policy.enrollment)?;

    let gallery = store.student_embeddings()?;
    let decision = match_embedding(&scan.embedding, &gallery, policy.match_threshold)?;

    if !decision.matched {
        return Ok(RecognizeOutcome {
            decision,
            student: None,
            attendance: AttendanceStatus::Skipped,
        });
    }

    let student = store.student_by_id(&decision.student_id)?;
    let today = Local::now().date_naive();

    let attendance =
        match record_attendance(store, &decision.student_id, today, Some(decision.confidence)) {
            Ok(MarkOutcome::Recorded { record_id }) => AttendanceStatus::Recorded { record_id },
            Ok(MarkOutcome::AlreadyMarked) => AttendanceStatus::AlreadyMarked,
            Err(e) => {
                tracing::warn!(error = %e, student = %student.code, "attendance write failed");
                let payload = serde_json::json!({
                    "student_id": decision.student_id,
                    "date": today.to_string(),
                    "confidence": decision.confidence,
                });
                let queued = store.enqueue_offline(OP_RECORD_ATTENDANCE, &payload).is_ok();
                AttendanceStatus::Failed { queued }
            }
        };

    Ok(RecognizeOutcome {
        decision,
        student: Some(student),
        attendance,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct QueuedAttendance {
    student_id: String,
    date: NaiveDate,
    confidence: Option<f32>,
}

/// Replay queued attendance writes. A replay that lands on "already marked"
/// is a success (somebody else recorded it first) and is dequeued; fresh
/// failures stay queued with their retry count bumped.
pub fn replay_queue<S: EngineStore + ?Sized>(store: &S) -> Result<QueueFlushReport, EngineError> {
    let pending = store.pending_queue()?;
    let mut replayed = 0usize;
    let mut requeued = 0usize;

    for entry in pending {
        if entry.operation != OP_RECORD_ATTENDANCE {
            tracing::warn!(operation = %entry.operation, id = %entry.id, "unknown queued operation, dropping");
            store.remove_queued(&entry.id)?;
            continue;
        }
        let queued: QueuedAttendance = match serde_json::from_value(entry.payload.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "malformed queue payload, dropping");
                store.remove_queued(&entry.id)?;
                continue;
            }
        };

        match record_attendance(store, &queued.student_id, queued.date, queued.confidence) {
            Ok(_) => {
                store.remove_queued(&entry.id)?;
                replayed += 1;
            }
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "queued write failed again");
                store.bump_retry(&entry.id)?;
                requeued += 1;
            }
        }
    }

    tracing::info!(replayed, requeued, "offline queue flushed");
    Ok(QueueFlushReport { replayed, requeued })
}
