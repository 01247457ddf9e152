use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding must not be empty")]
    Empty,
    #[error("embedding length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Face embedding vector (length fixed by the embedding oracle, e.g. 128).
///
/// The length is checked at every comparison — vectors of different lengths
/// come from incompatible oracle versions and must never be compared by
/// truncation or padding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance to another embedding of the same length.
    ///
    /// Symmetric, and exactly zero against itself.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        if self.len() != other.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Ok(sum.sqrt())
    }
}

/// Map a Euclidean distance to a confidence score in [0, 1].
///
/// Distances of 1.0 and beyond all collapse to zero confidence; the scale is
/// only meaningful for unit-normalized embeddings from the reference oracle.
pub fn confidence_from_distance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// One enrolled identity in the matching gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub student_id: String,
    pub embedding: Embedding,
}

/// Outcome of matching one query embedding against the gallery.
///
/// `student_id`, `confidence` and `distance` always describe the best
/// candidate, even when `matched` is false — callers use them for
/// diagnostics and re-registration prompts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub student_id: String,
    pub confidence: f32,
    pub distance: f32,
    pub matched: bool,
}

/// An enrolled student, minus the embedding (fetched separately as
/// [`EnrolledFace`] when matching).
#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: String,
    /// External student code, unique among active students.
    pub code: String,
    pub name: String,
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub active: bool,
    pub enrolled_at: DateTime<Utc>,
}

/// One attendance row. At most one exists per (student, date).
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub confidence: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_symmetric() {
        let a = Embedding::new(vec![0.2, 0.5, 0.9]).unwrap();
        let b = Embedding::new(vec![0.1, 0.4, 0.3]).unwrap();
        assert_eq!(
            a.euclidean_distance(&b).unwrap(),
            b.euclidean_distance(&a).unwrap()
        );
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = Embedding::new(vec![0.25, -0.5, 1.5]).unwrap();
        assert_eq!(a.euclidean_distance(&a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_rejects_length_mismatch() {
        let a = Embedding::new(vec![0.0; 128]).unwrap();
        let b = Embedding::new(vec![0.0; 64]).unwrap();
        assert_eq!(
            a.euclidean_distance(&b),
            Err(EmbeddingError::DimensionMismatch {
                expected: 128,
                got: 64
            })
        );
    }

    #[test]
    fn test_empty_embedding_rejected() {
        assert_eq!(Embedding::new(vec![]), Err(EmbeddingError::Empty));
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(confidence_from_distance(0.0), 1.0);
        assert_eq!(confidence_from_distance(1.7), 0.0);
        let c = confidence_from_distance(0.25);
        assert!((c - 0.75).abs() < 1e-6);
    }
}
