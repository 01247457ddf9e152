//! Gallery matcher.
//!
//! One fixed metric per deployment: Euclidean distance, with confidence
//! `clamp(1 - distance, 0, 1)`. The 0.6 default threshold is on the
//! confidence scale and is NOT transferable to a cosine-similarity metric.

use thiserror::Error;

use crate::types::{confidence_from_distance, Embedding, EmbeddingError, EnrolledFace, MatchDecision};

/// Minimum confidence for a positive match (128-dim reference oracle).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Nobody enrolled yet — distinct from "no match found", which is a
    /// normal `matched: false` decision.
    #[error("no enrolled faces to compare against")]
    NoCandidates,
    #[error(transparent)]
    Dimension(#[from] EmbeddingError),
}

/// Compare a query embedding against every enrolled face and pick the best.
///
/// The whole gallery is always scanned; the winner is the entry with the
/// highest confidence (lowest distance), and an exact tie keeps the entry
/// encountered first, so the result is deterministic for a given input
/// order. A length mismatch against any entry is an error, never a skip.
pub fn match_embedding(
    query: &Embedding,
    gallery: &[EnrolledFace],
    threshold: f32,
) -> Result<MatchDecision, MatchError> {
    let Some(first) = gallery.first() else {
        return Err(MatchError::NoCandidates);
    };

    let mut best_idx = 0usize;
    let mut best_distance = query.euclidean_distance(&first.embedding)?;
    let mut best_confidence = confidence_from_distance(best_distance);

    for (i, face) in gallery.iter().enumerate().skip(1) {
        let distance = query.euclidean_distance(&face.embedding)?;
        let confidence = confidence_from_distance(distance);
        // Strict comparison: ties keep the earlier entry.
        if confidence > best_confidence {
            best_idx = i;
            best_distance = distance;
            best_confidence = confidence;
        }
    }

    let matched = best_confidence > threshold;
    tracing::debug!(
        student = %gallery[best_idx].student_id,
        confidence = best_confidence,
        distance = best_distance,
        matched,
        gallery = gallery.len(),
        "matcher decision"
    );

    Ok(MatchDecision {
        student_id: gallery[best_idx].student_id.clone(),
        confidence: best_confidence,
        distance: best_distance,
        matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(id: &str, values: Vec<f32>) -> EnrolledFace {
        EnrolledFace {
            student_id: id.to_string(),
            embedding: Embedding::new(values).unwrap(),
        }
    }

    #[test]
    fn test_close_query_matches() {
        let gallery = vec![face("S1", vec![1.0, 0.0, 0.0]), face("S2", vec![0.0, 1.0, 0.0])];
        let query = Embedding::new(vec![0.9, 0.1, 0.0]).unwrap();

        let decision = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(decision.student_id, "S1");
        assert!((decision.distance - 0.1414).abs() < 1e-3);
        assert!((decision.confidence - 0.8586).abs() < 1e-3);
        assert!(decision.matched);
    }

    #[test]
    fn test_far_query_reports_diagnostics_without_match() {
        let gallery = vec![face("S1", vec![1.0, 0.0, 0.0]), face("S2", vec![0.0, 1.0, 0.0])];
        let query = Embedding::new(vec![0.5, 0.5, 0.5]).unwrap();

        let decision = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert!(!decision.matched);
        // Winner is still reported for diagnostics.
        assert!(!decision.student_id.is_empty());
        assert!(decision.confidence < DEFAULT_MATCH_THRESHOLD);
        assert!(decision.distance > 0.0);
    }

    #[test]
    fn test_empty_gallery_is_an_error() {
        let query = Embedding::new(vec![1.0, 0.0]).unwrap();
        assert_eq!(
            match_embedding(&query, &[], DEFAULT_MATCH_THRESHOLD),
            Err(MatchError::NoCandidates)
        );
    }

    #[test]
    fn test_exact_tie_keeps_first_listed() {
        // Two entries equidistant from the query.
        let gallery = vec![
            face("first", vec![1.0, 0.0]),
            face("second", vec![0.0, 1.0]),
        ];
        let query = Embedding::new(vec![0.5, 0.5]).unwrap();

        let decision = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(decision.student_id, "first");
    }

    #[test]
    fn test_deterministic_across_calls() {
        let gallery = vec![
            face("S1", vec![0.3, 0.1, 0.8]),
            face("S2", vec![0.2, 0.9, 0.1]),
            face("S3", vec![0.7, 0.2, 0.2]),
        ];
        let query = Embedding::new(vec![0.31, 0.12, 0.78]).unwrap();

        let a = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        let b = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(a.student_id, b.student_id);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.distance, b.distance);
    }

    #[test]
    fn test_length_mismatch_fails_even_for_non_winner() {
        let gallery = vec![face("ok", vec![0.0; 128]), face("bad", vec![0.0; 64])];
        let query = Embedding::new(vec![0.0; 128]).unwrap();

        let err = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap_err();
        assert_eq!(
            err,
            MatchError::Dimension(EmbeddingError::DimensionMismatch {
                expected: 128,
                got: 64
            })
        );
    }

    #[test]
    fn test_best_entry_found_anywhere_in_gallery() {
        let gallery = vec![
            face("decoy1", vec![0.0, 1.0, 0.0]),
            face("decoy2", vec![0.0, 0.0, 1.0]),
            face("target", vec![1.0, 0.0, 0.0]),
        ];
        let query = Embedding::new(vec![1.0, 0.0, 0.0]).unwrap();

        let decision = match_embedding(&query, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(decision.student_id, "target");
        assert_eq!(decision.distance, 0.0);
        assert_eq!(decision.confidence, 1.0);
    }
}
