//! Embedding oracle seam.
//!
//! The oracle is whatever external pipeline turns an image into exactly one
//! face embedding — a cloud API, an ONNX sidecar, a test fake. This crate
//! only defines the contract; implementations live with their deployments.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Embedding;

#[derive(Error, Debug)]
pub enum OracleError {
    /// No face in the image — the user should recapture.
    #[error("no face detected in the image")]
    NoFace,
    /// More than one face — the user should recapture alone.
    #[error("multiple faces detected ({count}); exactly one face must be visible")]
    MultipleFaces { count: usize },
    #[error("embedding backend timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// Where the detected face sits within the captured frame.
///
/// Pixel coordinates, origin top-left, as reported by the oracle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceGeometry {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl FaceGeometry {
    /// Offset of the face center from the frame center, per axis, as a
    /// fraction of the half-frame. 0.0 = dead center, 1.0 = at the edge.
    pub fn center_offset_ratio(&self) -> (f32, f32) {
        let center_x = self.x + self.width / 2.0;
        let center_y = self.y + self.height / 2.0;
        let half_w = self.frame_width as f32 / 2.0;
        let half_h = self.frame_height as f32 / 2.0;
        (
            (center_x - half_w).abs() / half_w,
            (center_y - half_h).abs() / half_h,
        )
    }
}

/// One face capture: the embedding plus where the face was in the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceScan {
    pub embedding: Embedding,
    pub geometry: FaceGeometry,
}

/// External embedding producer. `embed` succeeds only when the image
/// contains exactly one face.
pub trait EmbeddingOracle: Send {
    fn embed(&mut self, image: &[u8]) -> Result<FaceScan, OracleError>;
}
