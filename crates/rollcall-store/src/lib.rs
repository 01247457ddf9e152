//! rollcall-store — SQLite-backed record store.
//!
//! Implements the core's [`RecordStore`](rollcall_core::RecordStore)
//! contract plus the surrounding student registry, attendance reporting,
//! and offline write queue. Embeddings are biometric templates and are
//! sealed with AES-256-GCM before they touch the database file.

pub mod crypto;
pub mod schema;
pub mod store;

pub use crypto::EmbeddingCipher;
pub use store::{NewStudent, QueueEntry, ReportRow, SqliteStore, Stats};
