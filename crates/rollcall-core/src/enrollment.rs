//! Enrollment capture validation and aggregation.
//!
//! Enrollment takes a fixed number of captures of the same person, gates
//! each on capture quality, and averages the embeddings into one
//! representative vector. Averaging smooths pose and lighting noise from any
//! single capture while staying comparable in constant time at recognition.

use thiserror::Error;

use crate::oracle::{FaceGeometry, FaceScan};
use crate::types::{Embedding, EmbeddingError};

// --- Reference enrollment policy ---
pub const ENROLLMENT_CAPTURES: usize = 3;
pub const MIN_FACE_SIZE_PX: f32 = 100.0;
pub const CENTER_TOLERANCE: f32 = 0.3;

/// Quality gate parameters for enrollment captures.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentPolicy {
    /// Exact number of captures required.
    pub captures: usize,
    /// Minimum face bounding-box size, both axes, in pixels.
    pub min_face_size: f32,
    /// Maximum face-center offset from frame center, per axis, as a
    /// fraction of the half-frame.
    pub center_tolerance: f32,
}

impl Default for EnrollmentPolicy {
    fn default() -> Self {
        Self {
            captures: ENROLLMENT_CAPTURES,
            min_face_size: MIN_FACE_SIZE_PX,
            center_tolerance: CENTER_TOLERANCE,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityIssue {
    #[error("face too small ({width:.0}x{height:.0} px, minimum {min:.0}) — move closer to the camera")]
    FaceTooSmall { width: f32, height: f32, min: f32 },
    #[error("face not centered (offset {x_ratio:.2}/{y_ratio:.2} of half-frame, tolerance {tolerance:.2})")]
    OffCenter {
        x_ratio: f32,
        y_ratio: f32,
        tolerance: f32,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("exactly {expected} capture(s) required, got {got}")]
    WrongCaptureCount { expected: usize, got: usize },
    /// `photo` is 1-based, matching how capture UIs number shots.
    #[error("photo {photo}: {reason}")]
    QualityRejected { photo: usize, reason: QualityIssue },
    #[error(transparent)]
    Dimension(#[from] EmbeddingError),
}

/// Gate a single capture on face size and centering.
///
/// "Exactly one face" is already guaranteed upstream: the oracle refuses to
/// produce a scan for zero or multiple faces.
pub fn check_quality(geometry: &FaceGeometry, policy: &EnrollmentPolicy) -> Result<(), QualityIssue> {
    if geometry.width < policy.min_face_size || geometry.height < policy.min_face_size {
        return Err(QualityIssue::FaceTooSmall {
            width: geometry.width,
            height: geometry.height,
            min: policy.min_face_size,
        });
    }

    let (x_ratio, y_ratio) = geometry.center_offset_ratio();
    if x_ratio > policy.center_tolerance || y_ratio > policy.center_tolerance {
        return Err(QualityIssue::OffCenter {
            x_ratio,
            y_ratio,
            tolerance: policy.center_tolerance,
        });
    }

    Ok(())
}

/// Validate every capture and average the embeddings coordinate-wise.
///
/// Sums run in f64 so that averaging N identical vectors reproduces the
/// input bit-for-bit.
pub fn aggregate_enrollment(
    scans: &[FaceScan],
    policy: &EnrollmentPolicy,
) -> Result<Embedding, EnrollmentError> {
    if scans.len() != policy.captures {
        return Err(EnrollmentError::WrongCaptureCount {
            expected: policy.captures,
            got: scans.len(),
        });
    }

    for (i, scan) in scans.iter().enumerate() {
        check_quality(&scan.geometry, policy).map_err(|reason| {
            EnrollmentError::QualityRejected {
                photo: i + 1,
                reason,
            }
        })?;
    }

    // A zero-capture policy is a misconfiguration; refuse rather than panic.
    let Some(first) = scans.first() else {
        return Err(EnrollmentError::WrongCaptureCount {
            expected: ENROLLMENT_CAPTURES,
            got: 0,
        });
    };

    let dim = first.embedding.len();
    let mut sums = vec![0.0f64; dim];
    for scan in scans {
        if scan.embedding.len() != dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                got: scan.embedding.len(),
            }
            .into());
        }
        for (sum, v) in sums.iter_mut().zip(scan.embedding.as_slice()) {
            *sum += f64::from(*v);
        }
    }

    let n = scans.len() as f64;
    let mean: Vec<f32> = sums.into_iter().map(|s| (s / n) as f32).collect();
    Ok(Embedding::new(mean)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centered_geometry() -> FaceGeometry {
        FaceGeometry {
            x: 270.0,
            y: 190.0,
            width: 100.0,
            height: 100.0,
            frame_width: 640,
            frame_height: 480,
        }
    }

    fn scan(values: Vec<f32>) -> FaceScan {
        FaceScan {
            embedding: Embedding::new(values).unwrap(),
            geometry: centered_geometry(),
        }
    }

    #[test]
    fn test_three_identical_captures_average_to_identity() {
        let values = vec![0.1, -0.73, 0.33, 0.999];
        let scans = vec![
            scan(values.clone()),
            scan(values.clone()),
            scan(values.clone()),
        ];

        let mean = aggregate_enrollment(&scans, &EnrollmentPolicy::default()).unwrap();
        assert_eq!(mean.as_slice(), values.as_slice());
    }

    #[test]
    fn test_mean_is_coordinate_wise() {
        let scans = vec![
            scan(vec![0.0, 3.0]),
            scan(vec![3.0, 0.0]),
            scan(vec![3.0, 3.0]),
        ];

        let mean = aggregate_enrollment(&scans, &EnrollmentPolicy::default()).unwrap();
        assert_eq!(mean.as_slice(), &[2.0, 2.0]);
    }

    #[test]
    fn test_wrong_capture_count() {
        let scans = vec![scan(vec![1.0]), scan(vec![1.0])];
        assert_eq!(
            aggregate_enrollment(&scans, &EnrollmentPolicy::default()),
            Err(EnrollmentError::WrongCaptureCount {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn test_small_face_rejected_with_photo_index() {
        let mut scans = vec![
            scan(vec![1.0, 0.0]),
            scan(vec![1.0, 0.0]),
            scan(vec![1.0, 0.0]),
        ];
        scans[1].geometry.width = 60.0;

        let err = aggregate_enrollment(&scans, &EnrollmentPolicy::default()).unwrap_err();
        match err {
            EnrollmentError::QualityRejected { photo, reason } => {
                assert_eq!(photo, 2);
                assert!(matches!(reason, QualityIssue::FaceTooSmall { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_off_center_face_rejected() {
        let mut scans = vec![
            scan(vec![1.0, 0.0]),
            scan(vec![1.0, 0.0]),
            scan(vec![1.0, 0.0]),
        ];
        scans[2].geometry.x = 0.0;
        scans[2].geometry.y = 0.0;

        let err = aggregate_enrollment(&scans, &EnrollmentPolicy::default()).unwrap_err();
        match err {
            EnrollmentError::QualityRejected { photo, reason } => {
                assert_eq!(photo, 3);
                assert!(matches!(reason, QualityIssue::OffCenter { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mismatched_capture_lengths_rejected() {
        let scans = vec![
            scan(vec![1.0, 0.0]),
            scan(vec![1.0, 0.0, 0.0]),
            scan(vec![1.0, 0.0]),
        ];
        assert_eq!(
            aggregate_enrollment(&scans, &EnrollmentPolicy::default()),
            Err(EnrollmentError::Dimension(
                EmbeddingError::DimensionMismatch {
                    expected: 2,
                    got: 3
                }
            ))
        );
    }
}
